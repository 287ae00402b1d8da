//! Pure reducer for the credential flow.
//!
//! `update` mutates [`AuthState`] and returns effects for the
//! orchestrator to execute. It never performs I/O itself, which keeps
//! every flow rule testable without a provider or a widget host.

use tracing::debug;

use crate::challenge::{ChallengeHandle, ChallengeSignal, ChallengeStatus};
use crate::effects::Effect;
use crate::events::AuthEvent;
use crate::notify::Notice;
use crate::providers::{OtpTicket, ProviderError, ProviderResult};
use crate::session::UserIdentity;
use crate::state::{
    ActiveChannel, AuthState, ChannelKind, EmailForm, FlowIntent, OtpEntry, PhoneForm,
};

/// Applies one event to the flow state and returns the effects it causes.
pub fn update(state: &mut AuthState, event: AuthEvent) -> Vec<Effect> {
    match event {
        AuthEvent::ChannelSelected { channel } => select_channel(state, channel),
        AuthEvent::IntentChanged { intent } => {
            state.flow.intent = intent;
            vec![]
        }
        AuthEvent::EmailCredentialChanged { email, password } => {
            if let ActiveChannel::Email(form) = &mut state.flow.channel {
                form.email = email;
                form.password = password;
            }
            vec![]
        }
        AuthEvent::PhoneNumberChanged { phone_number } => {
            if let ActiveChannel::Phone(form, _) = &mut state.flow.channel {
                // The outstanding code, if any, was sent to the old number.
                form.otp = None;
                form.phone_number = phone_number;
            }
            vec![]
        }
        AuthEvent::OtpCodeChanged { code } => {
            if let ActiveChannel::Phone(form, _) = &mut state.flow.channel
                && let Some(entry) = &mut form.otp
            {
                entry.entered_code = code;
            }
            vec![]
        }
        AuthEvent::SubmitEmail => submit_email(state),
        AuthEvent::SubmitPhone => submit_phone(state),
        AuthEvent::ConfirmOtp => confirm_otp(state),
        AuthEvent::SubmitFederated => submit_federated(state),
        AuthEvent::LinkEmail { email } => link_email(state, email),
        AuthEvent::Challenge(signal) => apply_challenge_signal(state, signal),
        AuthEvent::Session(event) => {
            state.session.apply(event);
            vec![]
        }
        AuthEvent::SignInResult { id, result } => {
            if !state.flow.submission.finish_if_active(id) {
                debug!(?id, "discarding stale sign-in result");
                return vec![];
            }
            handle_sign_in_result(state, result)
        }
        AuthEvent::VerificationSent { id, result } => {
            if !state.flow.submission.finish_if_active(id) {
                debug!(?id, "discarding stale verification-send result");
                return vec![];
            }
            handle_verification_sent(state, result)
        }
        AuthEvent::OtpConfirmResult { id, result } => {
            if !state.flow.submission.finish_if_active(id) {
                debug!(?id, "discarding stale code-confirm result");
                return vec![];
            }
            handle_otp_confirm_result(state, result)
        }
        AuthEvent::FederatedResult { id, result } => {
            if !state.flow.submission.finish_if_active(id) {
                debug!(?id, "discarding stale federated result");
                return vec![];
            }
            match result {
                Ok(_) => vec![],
                Err(err) => vec![Effect::Notify(Notice::error(format!(
                    "Federated sign-in failed: {err}"
                )))],
            }
        }
        AuthEvent::LinkEmailResult { id, result } => {
            if !state.flow.submission.finish_if_active(id) {
                debug!(?id, "discarding stale link-email result");
                return vec![];
            }
            match result {
                Ok(()) => vec![Effect::Notify(Notice::info(
                    "Verification email sent. Confirm it, then sign in again.",
                ))],
                Err(err) => vec![Effect::Notify(Notice::error(format!(
                    "Could not link email: {err}"
                )))],
            }
        }
    }
}

/// Switches the active channel.
///
/// Every selection is a fresh activation: the previous channel's
/// transient state (entered credentials, widget, pending code entry,
/// outstanding submission) is dropped so nothing leaks into the next
/// submission. Re-selecting Phone is how a surface obtains a fresh
/// widget after expiry.
fn select_channel(state: &mut AuthState, channel: Option<ChannelKind>) -> Vec<Effect> {
    let mut effects = Vec::new();

    if let ActiveChannel::Phone(_, handle) = &state.flow.channel {
        effects.push(Effect::DetachChallenge {
            widget_id: handle.widget_id,
        });
    }

    // A late result for the old channel must read as stale.
    state.flow.submission.clear();

    state.flow.channel = match channel {
        None => ActiveChannel::None,
        Some(ChannelKind::Email) => ActiveChannel::Email(EmailForm::default()),
        Some(ChannelKind::Phone) => {
            let handle = ChallengeHandle::new();
            effects.push(Effect::AttachChallenge {
                mount: state.flow.mount.clone(),
                widget_id: handle.widget_id,
            });
            ActiveChannel::Phone(PhoneForm::default(), handle)
        }
    };

    effects
}

/// Submits the email form. Invalid input and double submits are
/// silent no-ops; validation feedback is the surface's job.
fn submit_email(state: &mut AuthState) -> Vec<Effect> {
    if !state.submit_enabled() {
        return vec![];
    }
    let ActiveChannel::Email(form) = &state.flow.channel else {
        return vec![];
    };

    let id = state.flow.seq.next();
    state.flow.submission.begin(id);

    let effect = match state.flow.intent {
        FlowIntent::Login => Effect::SignInWithPassword {
            id,
            email: form.email.clone(),
            password: form.password.clone(),
        },
        FlowIntent::SignUp => Effect::CreateAccountWithPassword {
            id,
            email: form.email.clone(),
            password: form.password.clone(),
        },
    };
    vec![effect]
}

/// Requests a verification code for the phone form.
///
/// The resolved-challenge check happens here, at submission time, not
/// only at render time: expiry can arrive between the user's last
/// interaction and the submit.
fn submit_phone(state: &mut AuthState) -> Vec<Effect> {
    if !state.submit_enabled() {
        return vec![];
    }
    let ActiveChannel::Phone(form, handle) = &state.flow.channel else {
        return vec![];
    };
    let Some(token) = handle.token() else {
        return vec![];
    };

    let id = state.flow.seq.next();
    let effect = Effect::SendVerificationCode {
        id,
        phone_number: form.phone_number.clone(),
        challenge_token: token.to_string(),
    };
    state.flow.submission.begin(id);
    vec![effect]
}

/// Confirms the entered one-time code against the outstanding ticket.
fn confirm_otp(state: &mut AuthState) -> Vec<Effect> {
    if state.is_loading() {
        return vec![];
    }
    let ActiveChannel::Phone(form, _) = &state.flow.channel else {
        return vec![];
    };
    let Some(entry) = &form.otp else {
        return vec![];
    };
    if entry.entered_code.trim().is_empty() {
        return vec![];
    }

    let id = state.flow.seq.next();
    let effect = Effect::ConfirmVerificationCode {
        id,
        ticket: entry.ticket.clone(),
        code: entry.entered_code.clone(),
    };
    state.flow.submission.begin(id);
    vec![effect]
}

/// Starts the federated browser round-trip. Channel-independent.
fn submit_federated(state: &mut AuthState) -> Vec<Effect> {
    if state.is_loading() {
        return vec![];
    }

    let id = state.flow.seq.next();
    state.flow.submission.begin(id);
    vec![Effect::BeginFederatedLogin { id }]
}

/// Starts linking an email address to the signed-in account.
fn link_email(state: &mut AuthState, email: String) -> Vec<Effect> {
    if state.is_loading() {
        return vec![];
    }
    let session = state.session.current();
    let Some(identity) = session.identity() else {
        debug!("ignoring link-email without an authenticated session");
        return vec![];
    };
    if !crate::validate::is_well_formed_email(&email) {
        return vec![];
    }

    let id = state.flow.seq.next();
    state.flow.submission.begin(id);
    vec![Effect::AssociateEmail {
        id,
        user_id: identity.user_id.clone(),
        email,
    }]
}

/// Applies a widget signal to the active challenge handle.
///
/// Signals from any widget other than the live one are discarded; the
/// status only moves forward (`Unresolved -> Resolved -> Expired`).
fn apply_challenge_signal(state: &mut AuthState, signal: ChallengeSignal) -> Vec<Effect> {
    let ActiveChannel::Phone(form, handle) = &mut state.flow.channel else {
        debug!(widget_id = %signal.widget_id(), "discarding signal without a phone channel");
        return vec![];
    };
    if signal.widget_id() != handle.widget_id {
        debug!(widget_id = %signal.widget_id(), "discarding signal from a detached widget");
        return vec![];
    }

    match signal {
        ChallengeSignal::Resolved { token, .. } => {
            if handle.status == ChallengeStatus::Unresolved {
                handle.status = ChallengeStatus::Resolved { token };
            }
            vec![]
        }
        ChallengeSignal::Expired { .. } => {
            if handle.status == ChallengeStatus::Expired {
                return vec![];
            }
            handle.status = ChallengeStatus::Expired;
            // Any pending code entry rode on the expired token; an
            // in-flight send or confirm must land as stale.
            form.otp = None;
            state.flow.submission.clear();
            vec![Effect::Notify(Notice::error(
                "Verification expired. Select the phone channel again to re-verify.",
            ))]
        }
    }
}

fn handle_sign_in_result(
    state: &mut AuthState,
    result: ProviderResult<UserIdentity>,
) -> Vec<Effect> {
    match result {
        Ok(_) => {
            // Passwords are never retained longer than necessary. The
            // session itself arrives through the ambient stream.
            if let ActiveChannel::Email(form) = &mut state.flow.channel {
                *form = EmailForm::default();
            }
            vec![]
        }
        Err(err) => {
            // Entered values stay for correction and retry.
            vec![Effect::Notify(sign_in_failure_notice(state.flow.intent, &err))]
        }
    }
}

fn sign_in_failure_notice(intent: FlowIntent, err: &ProviderError) -> Notice {
    let verb = match intent {
        FlowIntent::Login => "Sign-in",
        FlowIntent::SignUp => "Sign-up",
    };
    Notice::error(format!("{verb} failed: {err}"))
}

fn handle_verification_sent(
    state: &mut AuthState,
    result: ProviderResult<OtpTicket>,
) -> Vec<Effect> {
    match result {
        Ok(ticket) => {
            if let ActiveChannel::Phone(form, _) = &mut state.flow.channel {
                form.otp = Some(OtpEntry {
                    ticket,
                    entered_code: String::new(),
                });
                vec![Effect::Notify(Notice::info(
                    "Verification code sent. Enter it to continue.",
                ))]
            } else {
                debug!("verification ticket arrived without a phone channel");
                vec![]
            }
        }
        Err(err) => vec![Effect::Notify(Notice::error(format!(
            "Could not send verification code: {err}"
        )))],
    }
}

fn handle_otp_confirm_result(
    state: &mut AuthState,
    result: ProviderResult<UserIdentity>,
) -> Vec<Effect> {
    // The confirmation is consumed either way; failure requires the
    // user to restart verification, never a silent retry.
    match result {
        Ok(_) => {
            if let ActiveChannel::Phone(form, _) = &mut state.flow.channel {
                *form = PhoneForm::default();
            }
            vec![]
        }
        Err(err) => {
            if let ActiveChannel::Phone(form, _) = &mut state.flow.channel {
                form.otp = None;
            }
            vec![Effect::Notify(Notice::error(format!(
                "Code confirmation failed: {err}"
            )))]
        }
    }
}
