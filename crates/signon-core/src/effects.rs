//! Flow effect types.
//!
//! Effects are commands returned by the reducer that the orchestrator
//! executes. They represent I/O and task spawning only (no direct state
//! mutations).
//!
//! This keeps the reducer pure: it only mutates state and returns
//! effects, never performs I/O or spawns tasks directly.

use crate::challenge::WidgetId;
use crate::notify::Notice;
use crate::providers::OtpTicket;
use crate::state::SubmissionId;

/// Effects returned by the reducer for the orchestrator to execute.
///
/// The reducer returns `Vec<Effect>` from each update call. Provider
/// effects carry the [`SubmissionId`] the reducer recorded as
/// outstanding; the spawned task echoes it back in its result event.
#[derive(Debug)]
pub enum Effect {
    /// Spawn a password sign-in.
    SignInWithPassword {
        id: SubmissionId,
        email: String,
        password: String,
    },

    /// Spawn an account creation.
    CreateAccountWithPassword {
        id: SubmissionId,
        email: String,
        password: String,
    },

    /// Spawn the federated browser round-trip.
    BeginFederatedLogin { id: SubmissionId },

    /// Spawn a verification-code send for the phone channel.
    SendVerificationCode {
        id: SubmissionId,
        phone_number: String,
        challenge_token: String,
    },

    /// Spawn a one-time code confirmation.
    ConfirmVerificationCode {
        id: SubmissionId,
        ticket: OtpTicket,
        code: String,
    },

    /// Spawn an email association request.
    AssociateEmail {
        id: SubmissionId,
        user_id: String,
        email: String,
    },

    /// Attach a challenge widget to a mount point.
    AttachChallenge { mount: String, widget_id: WidgetId },

    /// Release a challenge widget.
    DetachChallenge { widget_id: WidgetId },

    /// Publish a user-facing notice.
    Notify(Notice),
}
