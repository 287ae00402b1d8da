//! Authentication state owned by the orchestrator.
//!
//! Split in two: `session` is the ambient store written by the provider
//! subscription, `flow` is the credential flow the reducer drives. The
//! reducer receives the whole [`AuthState`] and is the only writer of
//! `flow`.

use crate::challenge::ChallengeHandle;
use crate::providers::OtpTicket;
use crate::session::SessionStore;
use crate::validate;

/// Whether the flow signs into an existing account or creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowIntent {
    #[default]
    Login,
    SignUp,
}

/// Credential channels a surface can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Email,
    Phone,
}

/// Email credential under edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailForm {
    pub email: String,
    pub password: String,
}

impl EmailForm {
    /// Well-formed address plus minimum-length password.
    pub fn is_valid(&self) -> bool {
        validate::is_well_formed_email(&self.email)
            && validate::password_meets_minimum(&self.password)
    }
}

/// One-time code entry awaiting confirmation.
///
/// Exists only between a successful verification send and the confirm
/// call that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpEntry {
    pub ticket: OtpTicket,
    pub entered_code: String,
}

/// Phone credential under edit, including any outstanding code entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneForm {
    pub phone_number: String,
    pub otp: Option<OtpEntry>,
}

impl PhoneForm {
    /// The provider validates number format; locally only presence.
    pub fn is_valid(&self) -> bool {
        validate::phone_number_present(&self.phone_number)
    }
}

/// Which credential channel is active.
///
/// Phone always carries its challenge handle, so a phone form without a
/// widget is unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveChannel {
    #[default]
    None,
    Email(EmailForm),
    Phone(PhoneForm, ChallengeHandle),
}

impl ActiveChannel {
    pub fn kind(&self) -> Option<ChannelKind> {
        match self {
            Self::None => None,
            Self::Email(_) => Some(ChannelKind::Email),
            Self::Phone(..) => Some(ChannelKind::Phone),
        }
    }
}

/// Identifies one provider submission for stale-response matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionId(u64);

/// Monotonic source of submission ids.
#[derive(Debug, Default, Clone)]
pub struct SubmissionSeq {
    next: u64,
}

impl SubmissionSeq {
    pub fn next(&mut self) -> SubmissionId {
        let id = SubmissionId(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

/// Tracks the single outstanding submission, if any.
#[derive(Debug, Default, Clone)]
pub struct SubmissionState {
    active: Option<SubmissionId>,
}

impl SubmissionState {
    pub fn is_pending(&self) -> bool {
        self.active.is_some()
    }

    pub fn begin(&mut self, id: SubmissionId) {
        self.active = Some(id);
    }

    /// Clears the submission if `id` is the outstanding one.
    ///
    /// Returns false for stale results; callers must discard those
    /// without touching state.
    pub fn finish_if_active(&mut self, id: SubmissionId) -> bool {
        if self.active == Some(id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Drops the outstanding submission, if any. A late result for it
    /// will then read as stale.
    pub fn clear(&mut self) {
        self.active = None;
    }
}

/// Credential flow state driven by the reducer.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub intent: FlowIntent,
    pub channel: ActiveChannel,
    pub submission: SubmissionState,
    pub seq: SubmissionSeq,
    /// Mount point the challenge widget binds to on phone activation.
    pub mount: String,
}

impl FlowState {
    pub fn new(intent: FlowIntent, mount: impl Into<String>) -> Self {
        Self {
            intent,
            channel: ActiveChannel::None,
            submission: SubmissionState::default(),
            seq: SubmissionSeq::default(),
            mount: mount.into(),
        }
    }
}

/// Everything the reducer reads and writes.
#[derive(Debug)]
pub struct AuthState {
    pub session: SessionStore,
    pub flow: FlowState,
}

impl AuthState {
    pub fn new(intent: FlowIntent, mount: impl Into<String>) -> Self {
        Self {
            session: SessionStore::new(),
            flow: FlowState::new(intent, mount),
        }
    }

    /// The joint loading flag: ambient resolution or an active
    /// submission. Submits are disabled whenever this is true.
    pub fn is_loading(&self) -> bool {
        self.session.current().is_resolving() || self.flow.submission.is_pending()
    }

    /// Recomputed on every read; never cached.
    pub fn submit_enabled(&self) -> bool {
        if self.is_loading() {
            return false;
        }
        match &self.flow.channel {
            ActiveChannel::None => false,
            ActiveChannel::Email(form) => form.is_valid(),
            ActiveChannel::Phone(form, handle) => form.is_valid() && handle.is_resolved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::ChallengeStatus;
    use crate::session::SessionEvent;

    fn settled_state() -> AuthState {
        let mut state = AuthState::new(FlowIntent::Login, "signin-challenge");
        state.session.apply(SessionEvent::SignedOut);
        state
    }

    /// Test: ids are handed out once and wrap without panicking.
    #[test]
    fn submission_ids_advance() {
        let mut seq = SubmissionSeq::default();
        let a = seq.next();
        let b = seq.next();
        assert_ne!(a, b);

        let mut wrapping = SubmissionSeq { next: u64::MAX };
        let _ = wrapping.next();
        let _ = wrapping.next();
    }

    /// Test: only the outstanding id finishes the submission; stale and
    /// repeated results are reported as such.
    #[test]
    fn finish_is_id_gated() {
        let mut seq = SubmissionSeq::default();
        let mut submission = SubmissionState::default();

        let stale = seq.next();
        let current = seq.next();
        submission.begin(current);
        assert!(submission.is_pending());

        assert!(!submission.finish_if_active(stale));
        assert!(submission.is_pending());

        assert!(submission.finish_if_active(current));
        assert!(!submission.is_pending());
        assert!(!submission.finish_if_active(current));
    }

    /// Test: no channel selected means nothing to submit.
    #[test]
    fn no_channel_disables_submit() {
        let state = settled_state();
        assert!(!state.submit_enabled());
    }

    /// Test: a short password disables submission on the email channel.
    #[test]
    fn email_validity_gates_submit() {
        let mut state = settled_state();
        state.flow.channel = ActiveChannel::Email(EmailForm {
            email: "user@example.com".to_string(),
            password: "abcde".to_string(),
        });
        assert!(!state.submit_enabled());

        state.flow.channel = ActiveChannel::Email(EmailForm {
            email: "user@example.com".to_string(),
            password: "abcdef".to_string(),
        });
        assert!(state.submit_enabled());
    }

    /// Test: the phone channel needs both a number and a resolved widget.
    #[test]
    fn phone_requires_resolved_challenge() {
        let mut state = settled_state();
        let form = PhoneForm {
            phone_number: "+15551234567".to_string(),
            otp: None,
        };
        let mut handle = ChallengeHandle::new();

        state.flow.channel = ActiveChannel::Phone(form.clone(), handle.clone());
        assert!(!state.submit_enabled());

        handle.status = ChallengeStatus::Resolved {
            token: "tok".to_string(),
        };
        state.flow.channel = ActiveChannel::Phone(form, handle);
        assert!(state.submit_enabled());
    }

    /// Test: ambient resolution and pending submissions both hold the
    /// loading flag.
    #[test]
    fn loading_flag_is_joint() {
        let mut state = AuthState::new(FlowIntent::Login, "m");
        assert!(state.is_loading());

        state.session.apply(SessionEvent::SignedOut);
        assert!(!state.is_loading());

        let id = state.flow.seq.next();
        state.flow.submission.begin(id);
        assert!(state.is_loading());

        assert!(state.flow.submission.finish_if_active(id));
        assert!(!state.is_loading());
    }
}
