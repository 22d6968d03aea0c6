/// Failures of the socket session.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("CAN-PANEL - interface: {0} is down")]
    InterfaceDown(String),
    #[error("CAN-PANEL - os error: {0}")]
    OsFailure(String),
    #[error("CAN-PANEL - socket is not opened")]
    NotOpen,
    #[error("CAN-PANEL - incomplete write: {written} of {expected} bytes")]
    WriteIncomplete { written: usize, expected: usize },
    #[error("CAN-PANEL - incomplete read: {0} bytes")]
    ReadIncomplete(usize),
}

impl SessionError {
    #[inline]
    pub fn os_failure<T: std::fmt::Display>(reason: T) -> Self {
        Self::OsFailure(reason.to_string())
    }
}

/// Failures of the external interface control commands.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("CAN-PANEL - command exited with code: {0}")]
    CommandFailed(i32),
    #[error("CAN-PANEL - command could not be started: {0}")]
    SpawnFailed(String),
    #[error("CAN-PANEL - command timed out after {0} ms")]
    Timeout(u64),
}
