use tokio::sync::mpsc;

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A user-facing message emitted by the flow reducer.
///
/// Provider failures and lifecycle hints surface here; state stays in
/// [`crate::state::AuthState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Sender for the orchestrator's notice stream.
pub type NoticeSender = mpsc::UnboundedSender<Notice>;

/// Receiver for the orchestrator's notice stream.
pub type NoticeReceiver = mpsc::UnboundedReceiver<Notice>;
