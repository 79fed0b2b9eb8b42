use serde::{Deserialize, Serialize};

use crm_core::campaign::ExecutionStatus;
use crm_core::error::{CrmError, CrmResult};

/// Describes a single valid state transition for an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    pub trigger: String,
}

/// Guards the execution lifecycle by enforcing a finite set of valid
/// state transitions. Test executions never leave `test`; terminal states
/// have no exits.
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    pub state: ExecutionStatus,
    pub transitions: Vec<StateTransition>,
}

impl ExecutionStateMachine {
    /// Creates a state machine positioned at `state` with all valid
    /// transitions pre-configured.
    pub fn new(state: ExecutionStatus) -> Self {
        let transitions = vec![
            // Pending ->
            StateTransition {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Pending,
                trigger: "step_advanced".to_string(),
            },
            StateTransition {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Completed,
                trigger: "sequence_complete".to_string(),
            },
            StateTransition {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Failed,
                trigger: "step_failed".to_string(),
            },
            // Test ->
            StateTransition {
                from: ExecutionStatus::Test,
                to: ExecutionStatus::Test,
                trigger: "test_step".to_string(),
            },
        ];

        Self { state, transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: &ExecutionStatus, to: &ExecutionStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.to == *to)
    }

    /// Attempts to move the state machine to `to`. Returns an error if the
    /// transition is not permitted.
    pub fn transition(&mut self, to: ExecutionStatus) -> CrmResult<()> {
        if self.can_transition(&self.state, &to) {
            self.state = to;
            Ok(())
        } else {
            Err(CrmError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new(ExecutionStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_paths() {
        let mut sm = ExecutionStateMachine::default();
        assert!(sm.transition(ExecutionStatus::Pending).is_ok());
        assert!(sm.transition(ExecutionStatus::Completed).is_ok());
        assert_eq!(sm.state, ExecutionStatus::Completed);

        let mut sm = ExecutionStateMachine::new(ExecutionStatus::Pending);
        assert!(sm.transition(ExecutionStatus::Failed).is_ok());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [ExecutionStatus::Completed, ExecutionStatus::Failed] {
            let mut sm = ExecutionStateMachine::new(terminal);
            for to in [
                ExecutionStatus::Pending,
                ExecutionStatus::Test,
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
            ] {
                assert!(matches!(
                    sm.transition(to),
                    Err(CrmError::InvalidTransition { .. })
                ));
            }
            assert_eq!(sm.state, terminal);
        }
    }

    #[test]
    fn test_test_executions_stay_test() {
        let mut sm = ExecutionStateMachine::new(ExecutionStatus::Test);
        assert!(sm.transition(ExecutionStatus::Test).is_ok());
        assert!(sm.transition(ExecutionStatus::Completed).is_err());
        assert!(sm.transition(ExecutionStatus::Pending).is_err());
    }
}
