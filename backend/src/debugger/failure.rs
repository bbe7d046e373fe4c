//! Failure injection for simulated action runs.

use std::collections::HashSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use ticketflow_shared::{Action, WorkflowContext};
use uuid::Uuid;

/// Decides whether a simulated action should fail.
///
/// Only consulted when the session's test data sets `simulate_failures`.
pub trait FailureInjector: Send + Sync {
    fn should_fail(&self, session_id: Uuid, action_index: usize, action: &Action) -> bool;
}

/// Never fails.
pub struct NoFailures;

impl FailureInjector for NoFailures {
    fn should_fail(&self, _session_id: Uuid, _action_index: usize, _action: &Action) -> bool {
        false
    }
}

/// Fails actions at a fixed rate using a seeded generator, so a given seed
/// always produces the same sequence of failures.
pub struct SeededFailureInjector {
    rng: Mutex<StdRng>,
    rate: f64,
}

impl SeededFailureInjector {
    pub fn new(rate: f64, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            rate: rate.clamp(0.0, 1.0),
        }
    }
}

impl FailureInjector for SeededFailureInjector {
    fn should_fail(&self, _session_id: Uuid, _action_index: usize, _action: &Action) -> bool {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(self.rate),
            Err(poisoned) => poisoned.into_inner().gen_bool(self.rate),
        }
    }
}

/// Fails exactly the listed action indices.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFailures {
    indices: HashSet<usize>,
}

impl ScriptedFailures {
    pub fn new(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            indices: indices.into_iter().collect(),
        }
    }

    /// Reads `fail_actions: [0, 2]` from test data. Returns `None` when the
    /// key is absent or not an array.
    pub fn from_test_data(test_data: &WorkflowContext) -> Option<Self> {
        let list = test_data.get("fail_actions")?.as_array()?;
        Some(Self::new(
            list.iter().filter_map(Value::as_u64).map(|i| i as usize),
        ))
    }
}

impl FailureInjector for ScriptedFailures {
    fn should_fail(&self, _session_id: Uuid, action_index: usize, _action: &Action) -> bool {
        self.indices.contains(&action_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action() -> Action {
        Action::add_tag("x")
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = SeededFailureInjector::new(0.5, 42);
        let b = SeededFailureInjector::new(0.5, 42);
        let id = Uuid::new_v4();

        let first: Vec<bool> = (0..32).map(|i| a.should_fail(id, i, &action())).collect();
        let second: Vec<bool> = (0..32).map(|i| b.should_fail(id, i, &action())).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rate_bounds() {
        let never = SeededFailureInjector::new(0.0, 1);
        let always = SeededFailureInjector::new(1.0, 1);
        let id = Uuid::new_v4();

        assert!((0..16).all(|i| !never.should_fail(id, i, &action())));
        assert!((0..16).all(|i| always.should_fail(id, i, &action())));
    }

    #[test]
    fn test_scripted_from_test_data() {
        let data = json!({ "fail_actions": [1, 3, "x"] });
        let scripted = ScriptedFailures::from_test_data(data.as_object().unwrap()).unwrap();
        let id = Uuid::new_v4();

        assert!(!scripted.should_fail(id, 0, &action()));
        assert!(scripted.should_fail(id, 1, &action()));
        assert!(scripted.should_fail(id, 3, &action()));

        let empty = json!({ "simulate_failures": true });
        assert!(ScriptedFailures::from_test_data(empty.as_object().unwrap()).is_none());
    }
}
