//! Flow event types.
//!
//! All inputs to the orchestrator (surface actions, widget signals,
//! ambient session events, async provider results) are converted to
//! [`AuthEvent`] before the reducer processes them.
//!
//! ## Inbox Pattern
//!
//! Async provider calls send their result events directly to the
//! orchestrator's inbox. Result events carry the [`SubmissionId`] they
//! were spawned for; the reducer discards results whose id no longer
//! matches the outstanding submission.

use tokio::sync::mpsc;

use crate::challenge::ChallengeSignal;
use crate::providers::{OtpTicket, ProviderResult};
use crate::session::{SessionEvent, UserIdentity};
use crate::state::{ChannelKind, FlowIntent, SubmissionId};

/// Sender half of the orchestrator inbox.
pub type AuthEventSender = mpsc::UnboundedSender<AuthEvent>;

/// Receiver half of the orchestrator inbox.
pub type AuthEventReceiver = mpsc::UnboundedReceiver<AuthEvent>;

/// Unified event enum for the credential flow.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    // ------------------------------------------------------------------
    // Surface actions
    // ------------------------------------------------------------------
    /// Channel chosen on the surface; `None` dismisses the active one.
    ChannelSelected { channel: Option<ChannelKind> },

    /// Login / sign-up toggle.
    IntentChanged { intent: FlowIntent },

    /// Email form edit.
    EmailCredentialChanged { email: String, password: String },

    /// Phone number edit.
    PhoneNumberChanged { phone_number: String },

    /// One-time code edit.
    OtpCodeChanged { code: String },

    /// Submit on the email channel.
    SubmitEmail,

    /// Submit on the phone channel (requests the verification code).
    SubmitPhone,

    /// Confirm the entered one-time code.
    ConfirmOtp,

    /// Start the federated browser flow.
    SubmitFederated,

    /// Link an email address to the signed-in account.
    LinkEmail { email: String },

    // ------------------------------------------------------------------
    // Widget and ambient inputs
    // ------------------------------------------------------------------
    /// Signal from a challenge widget.
    Challenge(ChallengeSignal),

    /// Ambient session transition from the provider stream.
    Session(SessionEvent),

    // ------------------------------------------------------------------
    // Async results
    // ------------------------------------------------------------------
    /// Password sign-in or account creation finished.
    SignInResult {
        id: SubmissionId,
        result: ProviderResult<UserIdentity>,
    },

    /// Verification-code send finished.
    VerificationSent {
        id: SubmissionId,
        result: ProviderResult<OtpTicket>,
    },

    /// One-time code confirmation finished.
    OtpConfirmResult {
        id: SubmissionId,
        result: ProviderResult<UserIdentity>,
    },

    /// Federated round-trip finished.
    FederatedResult {
        id: SubmissionId,
        result: ProviderResult<UserIdentity>,
    },

    /// Email association request finished.
    LinkEmailResult {
        id: SubmissionId,
        result: ProviderResult<()>,
    },
}
