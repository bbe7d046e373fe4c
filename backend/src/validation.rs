//! Workflow definition validation.
//!
//! Runs before anything is persisted. Action configs have already been
//! decoded into their typed form, so only the shallow checks remain.

use regex::Regex;
use ticketflow_shared::{ConditionOperator, Workflow};

use crate::error::{ValidationBuilder, WorkflowResult};

pub const MAX_NAME_LENGTH: usize = 255;

/// Validated wrapper type - indicates the value has been validated
#[derive(Debug, Clone)]
pub struct Validated<T>(T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Validated<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub fn validate_workflow(workflow: Workflow) -> WorkflowResult<Validated<Workflow>> {
    let mut errors = ValidationBuilder::new();

    let name = workflow.name.trim();
    if name.is_empty() {
        errors.push("name", "Name is required");
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.push("name", &format!("Name must be at most {} characters", MAX_NAME_LENGTH));
    }

    if workflow.triggers.is_empty() {
        errors.push("triggers", "At least one trigger is required");
    }
    if workflow.actions.is_empty() {
        errors.push("actions", "At least one action is required");
    }

    for (i, condition) in workflow.conditions.iter().enumerate() {
        let field = format!("conditions[{}]", i);
        if condition.field.trim().is_empty() {
            errors.push(&field, "Condition field is required");
        }
        match condition.operator {
            ConditionOperator::Unknown => errors.push(&field, "Unknown condition operator"),
            ConditionOperator::MatchesRegex => {
                let pattern = condition.value.as_str().unwrap_or_default();
                if let Err(e) = Regex::new(pattern) {
                    errors.push(&field, &format!("Invalid regex: {}", e));
                }
            }
            _ => {}
        }
    }

    for (i, action) in workflow.actions.iter().enumerate() {
        let field = format!("actions[{}]", i);
        for problem in action.config.validate() {
            errors.push(&field, &problem);
        }
    }

    match errors.build() {
        Some(err) => Err(err),
        None => Ok(Validated(workflow)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use ticketflow_shared::{Action, Condition, Trigger, TriggerType};

    fn valid() -> Workflow {
        Workflow::new("Close spam")
            .with_trigger(Trigger::new(TriggerType::TicketCreated))
            .with_condition(Condition::contains("subject", "unsubscribe"))
            .with_action(Action::change_status("closed"))
    }

    #[test]
    fn test_valid_workflow_passes() {
        let validated = validate_workflow(valid()).unwrap();
        assert_eq!(validated.name, "Close spam");
    }

    #[test]
    fn test_collects_all_problems() {
        let mut workflow = Workflow::new("  ");
        workflow.conditions.push(Condition::new("", ConditionOperator::MatchesRegex, "(["));
        workflow.actions.push(Action::change_status(""));

        let err = validate_workflow(workflow).unwrap_err();
        let WorkflowError::Validation { details } = err else {
            panic!("expected validation error");
        };
        assert!(details.contains_key("name"));
        assert!(details.contains_key("triggers"));
        assert_eq!(details["conditions[0]"].len(), 2);
        assert!(details["actions[0]"][0].contains("new_status"));
        assert!(!details.contains_key("actions"));
    }

    #[test]
    fn test_rejects_unknown_operator_and_long_name() {
        let mut workflow = valid();
        workflow.name = "x".repeat(MAX_NAME_LENGTH + 1);
        workflow.conditions.push(Condition::new("priority", ConditionOperator::Unknown, "high"));

        let err = validate_workflow(workflow).unwrap_err();
        let WorkflowError::Validation { details } = err else {
            panic!("expected validation error");
        };
        assert!(details.contains_key("name"));
        assert!(details.contains_key("conditions[1]"));
    }
}
