//! Per-call state machine.

/// Lifecycle of one runner operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallState {
    /// No session has been opened yet.
    #[default]
    Idle,
    /// A session is open; pipes are being acquired.
    SessionOpen,
    /// The command is running and its output is being drained.
    Streaming,
    /// The operation completed without error.
    Success,
    /// The operation failed.
    Failure,
}

impl CallState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Idle -> SessionOpen
    /// - Idle -> Failure (session could not be opened)
    /// - SessionOpen -> Streaming
    /// - SessionOpen -> Failure (pipe setup failed)
    /// - Streaming -> Success
    /// - Streaming -> Failure
    pub fn can_transition_to(&self, target: CallState) -> bool {
        use CallState::*;
        matches!(
            (*self, target),
            (Idle, SessionOpen)
                | (Idle, Failure)
                | (SessionOpen, Streaming)
                | (SessionOpen, Failure)
                | (Streaming, Success)
                | (Streaming, Failure)
        )
    }

    /// Move to `target`, returning false (and staying put) if the
    /// transition is not allowed.
    pub fn advance(&mut self, target: CallState) -> bool {
        if self.can_transition_to(target) {
            *self = target;
            true
        } else {
            false
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Success | CallState::Failure)
    }
}
