//! Bot-detection challenge lifecycle: one widget per Phone activation,
//! attached to a mount point and torn down on channel switch.

use tokio::sync::mpsc;
use uuid::Uuid;

pub mod hosted;

pub use hosted::HostedChallenge;

/// Identifies one widget instance across attach, signals and detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidgetId(Uuid);

impl WidgetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WidgetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WidgetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Progress of a challenge widget.
///
/// `Unresolved -> Resolved -> Expired`, forward only. A widget that has
/// expired cannot be reused; the only way back is a fresh attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStatus {
    Unresolved,
    Resolved { token: String },
    Expired,
}

/// Flow-side view of an attached challenge widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeHandle {
    pub widget_id: WidgetId,
    pub status: ChallengeStatus,
}

impl ChallengeHandle {
    /// A freshly attached, not yet solved widget.
    pub fn new() -> Self {
        Self {
            widget_id: WidgetId::new(),
            status: ChallengeStatus::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.status, ChallengeStatus::Resolved { .. })
    }

    /// The verification token, present only while resolved.
    pub fn token(&self) -> Option<&str> {
        match &self.status {
            ChallengeStatus::Resolved { token } => Some(token),
            _ => None,
        }
    }
}

impl Default for ChallengeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Event reported by a live widget. Carries the originating widget id so
/// signals from a detached widget can be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeSignal {
    Resolved { widget_id: WidgetId, token: String },
    Expired { widget_id: WidgetId },
}

impl ChallengeSignal {
    pub fn widget_id(&self) -> WidgetId {
        match self {
            Self::Resolved { widget_id, .. } | Self::Expired { widget_id } => *widget_id,
        }
    }
}

/// Sender half for widget signals, handed to the host on attach.
pub type ChallengeSignalSender = mpsc::UnboundedSender<ChallengeSignal>;

/// Receiver half, drained by the orchestrator.
pub type ChallengeSignalReceiver = mpsc::UnboundedReceiver<ChallengeSignal>;

/// Owns the concrete widget instances behind challenge handles.
///
/// `attach` must start at most one live widget per mount point and report
/// progress on `signals`, tagged with `widget_id`. `detach` releases the
/// widget and stops further signals; both are fire-and-forget so the
/// orchestrator loop never blocks on widget plumbing.
pub trait ChallengeHost: Send + Sync {
    fn attach(&self, mount: &str, widget_id: WidgetId, signals: ChallengeSignalSender);

    fn detach(&self, widget_id: WidgetId);
}

/// Host for flows that never activate the phone channel. Widgets attached
/// here stay unresolved forever.
#[derive(Debug, Default)]
pub struct NoopChallengeHost;

impl ChallengeHost for NoopChallengeHost {
    fn attach(&self, _mount: &str, _widget_id: WidgetId, _signals: ChallengeSignalSender) {}

    fn detach(&self, _widget_id: WidgetId) {}
}
