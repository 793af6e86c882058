use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Coarse lifecycle phase of a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Lobby: players may join, no question is running.
    Waiting,
    /// A question is live and the countdown is running.
    Question,
    /// The current question is closed and results are shown.
    Results,
    /// The session has ended; no outgoing transitions exist.
    Final,
}

impl Phase {
    /// Whether this phase accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Final)
    }
}

/// The slice of a session snapshot the flow machine evaluates its guards
/// against.
#[derive(Debug, Clone, Copy)]
pub struct FlowView {
    /// Phase the store reports for the session.
    pub phase: Phase,
    /// Question index the store reports, `None` before the first question.
    pub current_question_index: Option<usize>,
    /// Whether a question start time is present in the snapshot.
    pub has_start_time: bool,
    /// Cached countdown seconds from the snapshot.
    pub time_remaining: u32,
    /// Whether the snapshot says a countdown is running.
    pub is_active: bool,
    /// Number of questions in the quiz the session runs.
    pub total_questions: usize,
}

/// Outcome of feeding one snapshot through [`GameFlow::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Snapshot matched the current phase and no guard fired.
    Unchanged,
    /// The store reported a different phase and the machine adopted it.
    Adopted {
        /// Phase the machine was in.
        from: Phase,
        /// Phase reported by the store.
        to: Phase,
    },
    /// A guard fired and the machine stepped forward on its own.
    Stepped {
        /// Phase the machine was in.
        from: Phase,
        /// Phase the guard selected.
        to: Phase,
    },
    /// A guard fired but the refractory window suppressed the step.
    Suppressed {
        /// Phase the machine stayed in.
        from: Phase,
        /// Phase the guard would have selected.
        to: Phase,
    },
}

/// Advisory phase machine mirroring the session lifecycle.
///
/// The store is strictly authoritative: whenever a snapshot reports a phase
/// that differs from the machine's, the machine adopts it without argument.
/// Guard-driven steps only anticipate what the coordinator is about to
/// persist, and a short refractory window damps the duplicate notifications
/// a change stream is allowed to deliver. The machine itself never writes
/// anywhere; callers use the returned [`Advance`] for logging at most.
#[derive(Debug, Clone)]
pub struct GameFlow {
    phase: Phase,
    refractory: Duration,
    last_step: Option<Instant>,
}

impl GameFlow {
    /// Default refractory window between automatic steps.
    pub const DEFAULT_REFRACTORY: Duration = Duration::from_millis(500);

    /// Create a machine in the lobby phase.
    pub fn new(refractory: Duration) -> Self {
        Self::with_phase(Phase::Waiting, refractory)
    }

    /// Create a machine mirroring an already-running session.
    pub fn with_phase(phase: Phase, refractory: Duration) -> Self {
        Self {
            phase,
            refractory,
            last_step: None,
        }
    }

    /// Current mirrored phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Feed one store snapshot through the machine.
    pub fn observe(&mut self, view: &FlowView) -> Advance {
        if view.phase != self.phase {
            let from = self.phase;
            self.phase = view.phase;
            self.last_step = None;
            return Advance::Adopted {
                from,
                to: view.phase,
            };
        }

        let Some(next) = next_phase(self.phase, view) else {
            return Advance::Unchanged;
        };

        if let Some(stepped_at) = self.last_step {
            if stepped_at.elapsed() < self.refractory {
                return Advance::Suppressed {
                    from: self.phase,
                    to: next,
                };
            }
        }

        let from = self.phase;
        self.phase = next;
        self.last_step = Some(Instant::now());
        Advance::Stepped { from, to: next }
    }

    /// Override the mirrored phase, bypassing guards and the refractory
    /// window. Used for host-initiated early termination only.
    pub fn force(&mut self, to: Phase) -> Advance {
        let from = self.phase;
        self.phase = to;
        self.last_step = Some(Instant::now());
        Advance::Stepped { from, to }
    }
}

impl Default for GameFlow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REFRACTORY)
    }
}

/// Scan the transition guards for the first one matching the snapshot.
///
/// Malformed snapshots never error; a snapshot matching no guard simply
/// leaves the machine where it is.
fn next_phase(phase: Phase, view: &FlowView) -> Option<Phase> {
    match phase {
        Phase::Waiting => (view.is_active && view.has_start_time).then_some(Phase::Question),
        Phase::Question => {
            (!view.is_active || view.time_remaining == 0).then_some(Phase::Results)
        }
        Phase::Results => {
            if view.is_active && view.has_start_time {
                Some(Phase::Question)
            } else if view
                .current_question_index
                .is_some_and(|index| index + 1 >= view.total_questions)
            {
                Some(Phase::Final)
            } else {
                None
            }
        }
        Phase::Final => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(phase: Phase) -> FlowView {
        FlowView {
            phase,
            current_question_index: None,
            has_start_time: false,
            time_remaining: 0,
            is_active: false,
            total_questions: 3,
        }
    }

    fn no_refractory() -> GameFlow {
        GameFlow::new(Duration::ZERO)
    }

    #[test]
    fn initial_phase_is_waiting() {
        assert_eq!(GameFlow::default().phase(), Phase::Waiting);
    }

    #[test]
    fn waiting_steps_only_to_question() {
        let mut flow = no_refractory();

        // No guard fires while the lobby snapshot stays inert.
        assert_eq!(flow.observe(&view(Phase::Waiting)), Advance::Unchanged);

        let mut armed = view(Phase::Waiting);
        armed.is_active = true;
        armed.has_start_time = true;
        armed.current_question_index = Some(0);
        armed.time_remaining = 30;
        assert_eq!(
            flow.observe(&armed),
            Advance::Stepped {
                from: Phase::Waiting,
                to: Phase::Question,
            }
        );
        assert_eq!(flow.phase(), Phase::Question);
    }

    #[test]
    fn question_closes_when_inactive_or_expired() {
        let mut flow = GameFlow::with_phase(Phase::Question, Duration::ZERO);
        let mut expired = view(Phase::Question);
        expired.is_active = true;
        expired.has_start_time = true;
        expired.time_remaining = 0;
        assert_eq!(
            flow.observe(&expired),
            Advance::Stepped {
                from: Phase::Question,
                to: Phase::Results,
            }
        );

        let mut flow = GameFlow::with_phase(Phase::Question, Duration::ZERO);
        let mut ended = view(Phase::Question);
        ended.time_remaining = 12;
        ended.is_active = false;
        assert_eq!(
            flow.observe(&ended),
            Advance::Stepped {
                from: Phase::Question,
                to: Phase::Results,
            }
        );
    }

    #[test]
    fn results_advance_to_next_question_or_final() {
        let mut flow = GameFlow::with_phase(Phase::Results, Duration::ZERO);
        let mut rearmed = view(Phase::Results);
        rearmed.is_active = true;
        rearmed.has_start_time = true;
        rearmed.current_question_index = Some(1);
        assert_eq!(
            flow.observe(&rearmed),
            Advance::Stepped {
                from: Phase::Results,
                to: Phase::Question,
            }
        );

        let mut flow = GameFlow::with_phase(Phase::Results, Duration::ZERO);
        let mut last = view(Phase::Results);
        last.current_question_index = Some(2);
        assert_eq!(
            flow.observe(&last),
            Advance::Stepped {
                from: Phase::Results,
                to: Phase::Final,
            }
        );
    }

    #[test]
    fn results_hold_between_questions() {
        let mut flow = GameFlow::with_phase(Phase::Results, Duration::ZERO);
        let mut held = view(Phase::Results);
        held.current_question_index = Some(0);
        assert_eq!(flow.observe(&held), Advance::Unchanged);
        assert_eq!(flow.phase(), Phase::Results);
    }

    #[test]
    fn final_is_terminal() {
        assert!(Phase::Final.is_terminal());
        let mut flow = GameFlow::with_phase(Phase::Final, Duration::ZERO);
        let mut armed = view(Phase::Final);
        armed.is_active = true;
        armed.has_start_time = true;
        armed.time_remaining = 30;
        assert_eq!(flow.observe(&armed), Advance::Unchanged);
        assert_eq!(flow.phase(), Phase::Final);
    }

    #[test]
    fn reported_phase_is_adopted_over_local_state() {
        let mut flow = GameFlow::with_phase(Phase::Question, Duration::ZERO);
        assert_eq!(
            flow.observe(&view(Phase::Final)),
            Advance::Adopted {
                from: Phase::Question,
                to: Phase::Final,
            }
        );
        assert_eq!(flow.phase(), Phase::Final);
    }

    #[test]
    fn refractory_window_suppresses_rapid_duplicate_steps() {
        let mut flow = GameFlow::new(Duration::from_secs(60));

        let mut armed = view(Phase::Waiting);
        armed.is_active = true;
        armed.has_start_time = true;
        armed.time_remaining = 30;
        assert!(matches!(flow.observe(&armed), Advance::Stepped { .. }));

        // Duplicate notification arriving right behind the first: the machine
        // would step question -> results (stale remaining), but the window
        // holds it back.
        let mut duplicate = view(Phase::Question);
        duplicate.is_active = false;
        assert_eq!(
            flow.observe(&duplicate),
            Advance::Suppressed {
                from: Phase::Question,
                to: Phase::Results,
            }
        );
        assert_eq!(flow.phase(), Phase::Question);
    }

    #[test]
    fn adoption_resets_the_refractory_window() {
        let mut flow = GameFlow::new(Duration::from_secs(60));

        let mut armed = view(Phase::Waiting);
        armed.is_active = true;
        armed.has_start_time = true;
        armed.time_remaining = 30;
        flow.observe(&armed);

        // The store says results; adoption is never suppressed.
        let mut reported = view(Phase::Results);
        reported.current_question_index = Some(0);
        assert_eq!(
            flow.observe(&reported),
            Advance::Adopted {
                from: Phase::Question,
                to: Phase::Results,
            }
        );
    }

    #[test]
    fn force_bypasses_guards() {
        let mut flow = GameFlow::with_phase(Phase::Question, Duration::from_secs(60));
        assert_eq!(
            flow.force(Phase::Final),
            Advance::Stepped {
                from: Phase::Question,
                to: Phase::Final,
            }
        );
        assert_eq!(flow.phase(), Phase::Final);
    }
}
