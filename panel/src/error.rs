use can_core::error::{ControlError, SessionError};

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("CAN-PANEL - settings io error on `{path}`: {reason}")]
    Io { path: String, reason: String },
    #[error("CAN-PANEL - settings are not valid JSON: {0}")]
    Json(String),
    #[error("CAN-PANEL - field `{field}` is not valid hex: {reason}")]
    InvalidHex { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PanelError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("CAN-PANEL - io error: {0}")]
    Io(String),
}
