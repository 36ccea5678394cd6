//! Enabled/disabled state of the compensator.
//!
//! The state machine only records the transition; the controller applies the
//! side effects (timer, queue, neutral multiplier) based on the outcome.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    Active,
    Inactive,
}

/// Outcome of a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    /// Already in the requested state; nothing to do.
    Unchanged,
}

impl ActivationState {
    pub fn is_active(self) -> bool {
        matches!(self, ActivationState::Active)
    }

    pub fn enable(&mut self) -> Transition {
        match self {
            ActivationState::Active => Transition::Unchanged,
            ActivationState::Inactive => {
                *self = ActivationState::Active;
                Transition::Changed
            }
        }
    }

    pub fn disable(&mut self) -> Transition {
        match self {
            ActivationState::Inactive => Transition::Unchanged,
            ActivationState::Active => {
                *self = ActivationState::Inactive;
                Transition::Changed
            }
        }
    }
}
