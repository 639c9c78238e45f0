//! Pure state machine for the calibration loop
//!
//! No I/O and no async: `transition(state, event) -> (state, actions)` is
//! deterministic. Invalid transitions land in `Failed` (never panic).

use gauge_core::ConvergenceOutcome;

/// Loop state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Nothing running yet
    Idle,
    /// Loading patterns and the artifact batch
    Loading { iteration: u32 },
    /// Waiting on the oracle; `attempt` counts unreliable batches retried
    EvaluatingExpensive { iteration: u32, attempt: u32 },
    EvaluatingCheap { iteration: u32 },
    Analyzing { iteration: u32 },
    /// Saving the mutated pattern set
    Mutating { iteration: u32, mutations: usize },
    /// Writing the iteration log
    Logging { iteration: u32 },
    CheckingConvergence { iteration: u32 },
    /// Iteration finished; the next one may start
    Continuing { iteration: u32 },
    Converged { iteration: u32 },
    PlateauReached { iteration: u32 },
    MaxIterationsReached { iteration: u32 },
    /// Graceful cancellation
    Stopped { iteration: u32 },
    Failed { error: String },
}

impl State {
    /// Whether no further events are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Converged { .. }
                | State::PlateauReached { .. }
                | State::MaxIterationsReached { .. }
                | State::Stopped { .. }
                | State::Failed { .. }
        )
    }

    /// Iteration the state belongs to, if any
    pub fn iteration(&self) -> Option<u32> {
        match self {
            State::Loading { iteration }
            | State::EvaluatingExpensive { iteration, .. }
            | State::EvaluatingCheap { iteration }
            | State::Analyzing { iteration }
            | State::Mutating { iteration, .. }
            | State::Logging { iteration }
            | State::CheckingConvergence { iteration }
            | State::Continuing { iteration }
            | State::Converged { iteration }
            | State::PlateauReached { iteration }
            | State::MaxIterationsReached { iteration }
            | State::Stopped { iteration } => Some(*iteration),
            State::Idle | State::Failed { .. } => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Loading { .. } => "loading",
            State::EvaluatingExpensive { .. } => "evaluating_expensive",
            State::EvaluatingCheap { .. } => "evaluating_cheap",
            State::Analyzing { .. } => "analyzing",
            State::Mutating { .. } => "mutating",
            State::Logging { .. } => "logging",
            State::CheckingConvergence { .. } => "checking_convergence",
            State::Continuing { .. } => "continuing",
            State::Converged { .. } => "converged",
            State::PlateauReached { .. } => "plateau_reached",
            State::MaxIterationsReached { .. } => "max_iterations_reached",
            State::Stopped { .. } => "stopped",
            State::Failed { .. } => "failed",
        }
    }
}

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StartIteration { iteration: u32 },
    /// The iteration limit was already reached before starting
    LimitReached { iteration: u32 },
    ArtifactsLoaded { count: usize },
    ExpensiveComplete { sentinels: usize },
    /// Batch rejected; no log is written and the batch is retried
    ExpensiveUnreliable { failed: usize, total: usize },
    CheapComplete,
    AnalysisComplete { mutations: usize, patterns_changed: bool },
    PatternsSaved,
    LogWritten,
    ConvergenceChecked { outcome: ConvergenceOutcome },
    StopRequested,
    Error { message: String },
}

/// Side effects the engine performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    LoadBatch,
    EvaluateExpensive { attempt: u32 },
    EvaluateCheap,
    AnalyzeGaps,
    SavePatterns,
    /// Write the iteration log; `complete` is false for interrupted iterations
    WriteLog { complete: bool },
    CheckConvergence,
    LogActivity { message: String },
}

/// Pure state transition function
pub fn transition(state: State, event: Event) -> (State, Vec<Action>) {
    match (state, event) {
        (State::Idle | State::Continuing { .. }, Event::StartIteration { iteration }) => (
            State::Loading { iteration },
            vec![
                Action::LogActivity {
                    message: format!("Starting iteration {}", iteration),
                },
                Action::LoadBatch,
            ],
        ),

        // An abandoned unreliable batch may be restarted for the same iteration
        (
            State::EvaluatingExpensive {
                iteration: current, ..
            },
            Event::StartIteration { iteration },
        ) if iteration == current => (
            State::Loading { iteration },
            vec![
                Action::LogActivity {
                    message: format!("Retrying iteration {}", iteration),
                },
                Action::LoadBatch,
            ],
        ),

        (State::Idle | State::Continuing { .. }, Event::LimitReached { iteration }) => (
            State::MaxIterationsReached { iteration },
            vec![Action::LogActivity {
                message: format!("Iteration limit reached at {}", iteration),
            }],
        ),

        (State::Loading { iteration }, Event::ArtifactsLoaded { count }) => (
            State::EvaluatingExpensive {
                iteration,
                attempt: 1,
            },
            vec![
                Action::LogActivity {
                    message: format!("Loaded {} artifacts", count),
                },
                Action::EvaluateExpensive { attempt: 1 },
            ],
        ),

        (
            State::EvaluatingExpensive { iteration, attempt },
            Event::ExpensiveUnreliable { failed, total },
        ) => (
            State::EvaluatingExpensive {
                iteration,
                attempt: attempt + 1,
            },
            vec![
                Action::LogActivity {
                    message: format!(
                        "Oracle batch unreliable ({} of {} failed); retrying",
                        failed, total
                    ),
                },
                Action::EvaluateExpensive {
                    attempt: attempt + 1,
                },
            ],
        ),

        (State::EvaluatingExpensive { iteration, .. }, Event::ExpensiveComplete { sentinels }) => {
            let mut actions = Vec::new();
            if sentinels > 0 {
                actions.push(Action::LogActivity {
                    message: format!("{} sentinel results excluded", sentinels),
                });
            }
            actions.push(Action::EvaluateCheap);
            (State::EvaluatingCheap { iteration }, actions)
        }

        (State::EvaluatingCheap { iteration }, Event::CheapComplete) => {
            (State::Analyzing { iteration }, vec![Action::AnalyzeGaps])
        }

        (
            State::Analyzing { iteration },
            Event::AnalysisComplete {
                mutations,
                patterns_changed,
            },
        ) => {
            if patterns_changed {
                (
                    State::Mutating {
                        iteration,
                        mutations,
                    },
                    vec![Action::SavePatterns],
                )
            } else {
                (
                    State::Logging { iteration },
                    vec![Action::WriteLog { complete: true }],
                )
            }
        }

        (State::Mutating { iteration, mutations }, Event::PatternsSaved) => (
            State::Logging { iteration },
            vec![
                Action::LogActivity {
                    message: format!("Applied {} pattern mutations", mutations),
                },
                Action::WriteLog { complete: true },
            ],
        ),

        (State::Logging { iteration }, Event::LogWritten) => (
            State::CheckingConvergence { iteration },
            vec![Action::CheckConvergence],
        ),

        (State::CheckingConvergence { iteration }, Event::ConvergenceChecked { outcome }) => {
            let next = match outcome {
                ConvergenceOutcome::Continuing => State::Continuing { iteration },
                ConvergenceOutcome::Converged => State::Converged { iteration },
                ConvergenceOutcome::PlateauReached => State::PlateauReached { iteration },
                ConvergenceOutcome::MaxIterationsReached => {
                    State::MaxIterationsReached { iteration }
                }
            };
            (
                next,
                vec![Action::LogActivity {
                    message: format!("Iteration {} finished: {}", iteration, outcome),
                }],
            )
        }

        // Between iterations nothing is in flight, so there is nothing to log
        (State::Idle, Event::StopRequested) => (
            State::Stopped { iteration: 0 },
            vec![Action::LogActivity {
                message: "Stopped before the first iteration".to_string(),
            }],
        ),
        (State::Continuing { iteration }, Event::StopRequested) => (
            State::Stopped { iteration },
            vec![Action::LogActivity {
                message: format!("Stopped after iteration {}", iteration),
            }],
        ),

        // Mid-iteration: persist what exists as an incomplete log
        (
            State::Loading { iteration }
            | State::EvaluatingExpensive { iteration, .. }
            | State::EvaluatingCheap { iteration }
            | State::Analyzing { iteration }
            | State::Mutating { iteration, .. }
            | State::Logging { iteration }
            | State::CheckingConvergence { iteration },
            Event::StopRequested,
        ) => (
            State::Stopped { iteration },
            vec![
                Action::WriteLog { complete: false },
                Action::LogActivity {
                    message: format!("Iteration {} interrupted by stop request", iteration),
                },
            ],
        ),

        (state, Event::Error { message }) if !state.is_terminal() => (
            State::Failed {
                error: message.clone(),
            },
            vec![Action::LogActivity {
                message: format!("Error in {}: {}", state.name(), message),
            }],
        ),

        (state, event) if state.is_terminal() => (
            State::Failed {
                error: format!(
                    "Invalid transition from terminal state {:?} on event {:?}",
                    state, event
                ),
            },
            vec![],
        ),

        (state, event) => (
            State::Failed {
                error: format!(
                    "Invalid state transition: {:?} cannot handle event {:?}",
                    state, event
                ),
            },
            vec![],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(state: State, events: Vec<Event>) -> (State, Vec<Action>) {
        let mut state = state;
        let mut last = Vec::new();
        for event in events {
            let (next, actions) = transition(state, event);
            state = next;
            last = actions;
        }
        (state, last)
    }

    #[test]
    fn test_happy_path_full_flow() {
        let (state, actions) = transition(State::Idle, Event::StartIteration { iteration: 1 });
        assert_eq!(state, State::Loading { iteration: 1 });
        assert!(actions.contains(&Action::LoadBatch));

        let (state, actions) = transition(state, Event::ArtifactsLoaded { count: 3 });
        assert_eq!(
            state,
            State::EvaluatingExpensive {
                iteration: 1,
                attempt: 1
            }
        );
        assert!(actions.contains(&Action::EvaluateExpensive { attempt: 1 }));

        let (state, _) = transition(state, Event::ExpensiveComplete { sentinels: 0 });
        assert_eq!(state, State::EvaluatingCheap { iteration: 1 });

        let (state, _) = transition(state, Event::CheapComplete);
        assert_eq!(state, State::Analyzing { iteration: 1 });

        let (state, actions) = transition(
            state,
            Event::AnalysisComplete {
                mutations: 2,
                patterns_changed: true,
            },
        );
        assert!(matches!(state, State::Mutating { mutations: 2, .. }));
        assert_eq!(actions, vec![Action::SavePatterns]);

        let (state, actions) = transition(state, Event::PatternsSaved);
        assert_eq!(state, State::Logging { iteration: 1 });
        assert!(actions.contains(&Action::WriteLog { complete: true }));

        let (state, _) = transition(state, Event::LogWritten);
        assert_eq!(state, State::CheckingConvergence { iteration: 1 });

        let (state, _) = transition(
            state,
            Event::ConvergenceChecked {
                outcome: ConvergenceOutcome::Continuing,
            },
        );
        assert_eq!(state, State::Continuing { iteration: 1 });

        let (state, _) = transition(state, Event::StartIteration { iteration: 2 });
        assert_eq!(state, State::Loading { iteration: 2 });
    }

    #[test]
    fn test_unchanged_patterns_skip_mutating() {
        let (state, actions) = transition(
            State::Analyzing { iteration: 4 },
            Event::AnalysisComplete {
                mutations: 0,
                patterns_changed: false,
            },
        );
        assert_eq!(state, State::Logging { iteration: 4 });
        assert_eq!(actions, vec![Action::WriteLog { complete: true }]);
    }

    #[test]
    fn test_unreliable_batch_stays_in_expensive() {
        let (state, actions) = run(
            State::Loading { iteration: 2 },
            vec![
                Event::ArtifactsLoaded { count: 5 },
                Event::ExpensiveUnreliable { failed: 2, total: 5 },
            ],
        );
        assert_eq!(
            state,
            State::EvaluatingExpensive {
                iteration: 2,
                attempt: 2
            }
        );
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::WriteLog { .. })));
        assert!(actions.contains(&Action::EvaluateExpensive { attempt: 2 }));
    }

    #[test]
    fn test_unreliable_iteration_can_restart() {
        let stuck = State::EvaluatingExpensive {
            iteration: 2,
            attempt: 3,
        };
        let (state, actions) = transition(stuck.clone(), Event::StartIteration { iteration: 2 });
        assert_eq!(state, State::Loading { iteration: 2 });
        assert!(actions.contains(&Action::LoadBatch));

        let (state, actions) = transition(state, Event::ArtifactsLoaded { count: 5 });
        assert!(actions.contains(&Action::EvaluateExpensive { attempt: 1 }));
        assert_eq!(
            state,
            State::EvaluatingExpensive {
                iteration: 2,
                attempt: 1
            }
        );

        // A different iteration is still rejected
        let (state, _) = transition(stuck, Event::StartIteration { iteration: 3 });
        assert!(matches!(state, State::Failed { .. }));
    }

    #[test]
    fn test_terminal_outcomes() {
        for (outcome, expected) in [
            (ConvergenceOutcome::Converged, State::Converged { iteration: 5 }),
            (ConvergenceOutcome::PlateauReached, State::PlateauReached { iteration: 5 }),
            (
                ConvergenceOutcome::MaxIterationsReached,
                State::MaxIterationsReached { iteration: 5 },
            ),
        ] {
            let (state, _) = transition(
                State::CheckingConvergence { iteration: 5 },
                Event::ConvergenceChecked { outcome },
            );
            assert_eq!(state, expected);
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn test_stop_mid_iteration_writes_incomplete_log() {
        let (state, actions) = transition(
            State::EvaluatingExpensive {
                iteration: 3,
                attempt: 1,
            },
            Event::StopRequested,
        );
        assert_eq!(state, State::Stopped { iteration: 3 });
        assert!(actions.contains(&Action::WriteLog { complete: false }));
    }

    #[test]
    fn test_stop_between_iterations_writes_nothing() {
        let (state, actions) = transition(State::Continuing { iteration: 3 }, Event::StopRequested);
        assert_eq!(state, State::Stopped { iteration: 3 });
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::WriteLog { .. })));
    }

    #[test]
    fn test_limit_reached_before_start() {
        let (state, _) = transition(State::Idle, Event::LimitReached { iteration: 20 });
        assert_eq!(state, State::MaxIterationsReached { iteration: 20 });
    }

    #[test]
    fn test_error_fails_from_any_active_state() {
        let (state, _) = transition(
            State::Loading { iteration: 1 },
            Event::Error {
                message: "Pattern store corrupt".to_string(),
            },
        );
        assert!(matches!(state, State::Failed { ref error } if error.contains("corrupt")));
    }

    #[test]
    fn test_invalid_transition_never_panics() {
        let (state, _) = transition(State::Idle, Event::CheapComplete);
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = transition(State::Loading { iteration: 1 }, Event::LogWritten);
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = transition(
            State::Converged { iteration: 4 },
            Event::StartIteration { iteration: 5 },
        );
        assert!(matches!(state, State::Failed { .. }));

        let (state, _) = transition(
            State::Failed {
                error: "boom".to_string(),
            },
            Event::Error {
                message: "again".to_string(),
            },
        );
        assert!(matches!(state, State::Failed { ref error } if error.contains("terminal")));
    }
}
