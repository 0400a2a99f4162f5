/// Fluent accumulator for workflow definitions
///
/// Pure value type: nothing is persisted until the finished definition is
/// handed to `WorkflowService::save`.

use crate::error::{Result, WorkflowError};
use crate::workflow::types::{EmailEventTemplate, WorkflowDefinition};

#[derive(Debug, Clone, Default)]
pub struct WorkflowBuilder {
    name: String,
    description: String,
    email_events: Vec<EmailEventTemplate>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    /// Append one email; events keep the order in which they were added
    pub fn add_email_event(&mut self, event: EmailEventTemplate) -> &mut Self {
        self.email_events.push(event);
        self
    }

    /// Finish the definition, rejecting an empty name or an empty sequence
    pub fn build(&self) -> Result<WorkflowDefinition> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "incomplete workflow configuration: name is required".to_string(),
            ));
        }
        if self.email_events.is_empty() {
            return Err(WorkflowError::Validation(
                "incomplete workflow configuration: at least one email event is required"
                    .to_string(),
            ));
        }
        Ok(WorkflowDefinition::new(
            self.name.clone(),
            self.description.clone(),
            self.email_events.clone(),
        ))
    }
}
