//! Orchestrator runtime - owns the flow state and executes effects.
//!
//! This is the "Elm runtime" boundary: all side effects happen here.
//! The reducer stays pure and produces effects; this module spawns the
//! provider calls, drives the challenge host, and publishes notices.
//!
//! ## Inbox Pattern
//!
//! Everything that happens asynchronously lands in one inbox:
//! - Spawned provider calls send their result event when they finish
//! - A forwarder task pipes the provider's ambient session stream in
//! - Another forwarder pipes challenge widget signals in
//!
//! The surface drives the loop by dispatching its own actions through
//! [`Orchestrator::handle`] and awaiting [`Orchestrator::pump`] for
//! everything else.

use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::warn;

use crate::challenge::{ChallengeHost, ChallengeSignalSender};
use crate::effects::Effect;
use crate::events::{AuthEvent, AuthEventReceiver, AuthEventSender};
use crate::notify::{NoticeReceiver, NoticeSender};
use crate::providers::IdentityProvider;
use crate::state::{AuthState, FlowIntent};
use crate::update;

/// Event-loop glue between the pure reducer and the outside world.
///
/// Owns the [`AuthState`]; the store's single provider subscription is
/// claimed at construction and never re-established.
pub struct Orchestrator<P> {
    /// Authentication state (split: ambient session + credential flow).
    pub state: AuthState,
    provider: Arc<P>,
    host: Arc<dyn ChallengeHost>,
    /// Inbox sender - spawned tasks and forwarders send events here.
    inbox_tx: AuthEventSender,
    /// Inbox receiver - pump drains this.
    inbox_rx: AuthEventReceiver,
    /// Handed to the host on every attach; a forwarder owns the
    /// receiving end.
    signal_tx: ChallengeSignalSender,
    notices_tx: NoticeSender,
}

impl<P: IdentityProvider + 'static> Orchestrator<P> {
    /// Builds the orchestrator and wires the ambient plumbing.
    ///
    /// Returns the notice stream alongside; the surface renders notices
    /// from it as they arrive. Must be called from within a tokio
    /// runtime (forwarder tasks are spawned here).
    pub fn new(
        provider: Arc<P>,
        host: Arc<dyn ChallengeHost>,
        intent: FlowIntent,
        mount: impl Into<String>,
    ) -> (Self, NoticeReceiver) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let mut state = AuthState::new(intent, mount);

        if state.session.mark_subscribed() {
            let mut stream = provider.session_events();
            let tx = inbox_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = stream.next().await {
                    if tx.send(AuthEvent::Session(event)).is_err() {
                        return;
                    }
                }
                // Recoverable: the store keeps its last known state.
                warn!("provider session stream ended");
            });
        }

        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let tx = inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                if tx.send(AuthEvent::Challenge(signal)).is_err() {
                    return;
                }
            }
        });

        let orchestrator = Self {
            state,
            provider,
            host,
            inbox_tx,
            inbox_rx,
            signal_tx,
            notices_tx,
        };
        (orchestrator, notices_rx)
    }

    /// Sender for feeding events into the inbox from outside the loop.
    pub fn sender(&self) -> AuthEventSender {
        self.inbox_tx.clone()
    }

    /// Runs the reducer on one event and executes the effects it
    /// returns.
    pub fn handle(&mut self, event: AuthEvent) {
        let effects = update::update(&mut self.state, event);
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    /// Awaits the next inbox event, applies it, and returns it so the
    /// surface can re-render. `None` only if the inbox closed.
    pub async fn pump(&mut self) -> Option<AuthEvent> {
        let event = self.inbox_rx.recv().await?;
        self.handle(event.clone());
        Some(event)
    }

    /// Spawns an async effect whose result event lands in the inbox.
    fn spawn_effect<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AuthEvent> + Send + 'static,
    {
        let tx = self.inbox_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(f().await);
        });
    }

    fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::SignInWithPassword {
                id,
                email,
                password,
            } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider.sign_in_with_password(&email, &password).await;
                    AuthEvent::SignInResult { id, result }
                });
            }
            Effect::CreateAccountWithPassword {
                id,
                email,
                password,
            } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider.create_account_with_password(&email, &password).await;
                    AuthEvent::SignInResult { id, result }
                });
            }
            Effect::BeginFederatedLogin { id } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider.begin_federated_login().await;
                    AuthEvent::FederatedResult { id, result }
                });
            }
            Effect::SendVerificationCode {
                id,
                phone_number,
                challenge_token,
            } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider
                        .send_verification_code(&phone_number, &challenge_token)
                        .await;
                    AuthEvent::VerificationSent { id, result }
                });
            }
            Effect::ConfirmVerificationCode { id, ticket, code } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider.confirm_verification_code(&ticket, &code).await;
                    AuthEvent::OtpConfirmResult { id, result }
                });
            }
            Effect::AssociateEmail { id, user_id, email } => {
                let provider = Arc::clone(&self.provider);
                self.spawn_effect(move || async move {
                    let result = provider.associate_email(&user_id, &email).await;
                    AuthEvent::LinkEmailResult { id, result }
                });
            }
            Effect::AttachChallenge { mount, widget_id } => {
                self.host.attach(&mount, widget_id, self.signal_tx.clone());
            }
            Effect::DetachChallenge { widget_id } => {
                self.host.detach(widget_id);
            }
            Effect::Notify(notice) => {
                let _ = self.notices_tx.send(notice);
            }
        }
    }
}
