//! Auth command handlers.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use signon_core::challenge::{ChallengeHost, ChallengeStatus, HostedChallenge, NoopChallengeHost};
use signon_core::config::Config;
use signon_core::events::AuthEvent;
use signon_core::interrupt::{self, InterruptedError};
use signon_core::notify::{NoticeReceiver, Severity};
use signon_core::providers::cache;
use signon_core::providers::rest::{RestConfig, RestProvider};
use signon_core::runtime::Orchestrator;
use signon_core::session::UserIdentity;
use signon_core::state::{ActiveChannel, AuthState, ChannelKind, FlowIntent};
use signon_core::validate;

pub type CliOrchestrator = Orchestrator<RestProvider>;

pub fn build_orchestrator(
    config: &Config,
    host: Arc<dyn ChallengeHost>,
    intent: FlowIntent,
) -> Result<(CliOrchestrator, NoticeReceiver)> {
    let rest = RestConfig::from_env(
        config.provider.base_url.as_deref(),
        config.provider.api_key.as_deref(),
    )
    .context("resolve provider credentials")?;
    let provider = Arc::new(RestProvider::new(rest));
    Ok(Orchestrator::new(
        provider,
        host,
        intent,
        config.challenge.mount.clone(),
    ))
}

pub fn render_notices(notices: &mut NoticeReceiver) {
    while let Ok(notice) = notices.try_recv() {
        match notice.severity {
            Severity::Info => println!("{}", notice.message),
            Severity::Error => eprintln!("{}", notice.message),
        }
    }
}

/// Pumps orchestrator events until `done` holds, rendering notices as
/// they arrive. Ctrl+C aborts with [`InterruptedError`].
async fn pump_until(
    orch: &mut CliOrchestrator,
    notices: &mut NoticeReceiver,
    done: impl Fn(&AuthState) -> bool,
) -> Result<()> {
    loop {
        render_notices(notices);
        if done(&orch.state) {
            return Ok(());
        }
        tokio::select! {
            () = interrupt::wait_for_interrupt() => {
                return Err(InterruptedError.into());
            }
            event = orch.pump() => {
                if event.is_none() {
                    anyhow::bail!("Event loop closed unexpectedly");
                }
            }
        }
    }
}

/// Pumps until `pick` extracts a value from an inbox event.
///
/// Only call this with a submission outstanding; the matching result
/// event is what guarantees the wait ends.
pub async fn wait_for_event<T>(
    orch: &mut CliOrchestrator,
    notices: &mut NoticeReceiver,
    pick: impl Fn(&AuthEvent) -> Option<T>,
) -> Result<T> {
    loop {
        render_notices(notices);
        tokio::select! {
            () = interrupt::wait_for_interrupt() => {
                return Err(InterruptedError.into());
            }
            event = orch.pump() => match event {
                Some(event) => {
                    if let Some(value) = pick(&event) {
                        render_notices(notices);
                        return Ok(value);
                    }
                }
                None => anyhow::bail!("Event loop closed unexpectedly"),
            },
        }
    }
}

/// Waits for ambient resolution and any outstanding submission.
pub async fn settle(orch: &mut CliOrchestrator, notices: &mut NoticeReceiver) -> Result<()> {
    pump_until(orch, notices, |state| !state.is_loading()).await
}

/// Waits for the session wave that follows a provider-accepted
/// sign-in, so the store agrees with the result before reporting.
async fn await_signed_in(orch: &mut CliOrchestrator, notices: &mut NoticeReceiver) -> Result<()> {
    pump_until(orch, notices, |state| {
        state.session.current().is_authenticated()
    })
    .await
}

/// Prompts on stdout and reads one trimmed line. None means EOF.
fn prompt(label: &str) -> Result<Option<String>> {
    if interrupt::is_interrupted() {
        return Err(InterruptedError.into());
    }
    print!("{label}: ");
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Email when the account has one, otherwise the provider user id.
pub fn display_name(identity: &UserIdentity) -> &str {
    identity.email.as_deref().unwrap_or(&identity.user_id)
}

fn report_signed_in(intent: FlowIntent, identity: &UserIdentity) {
    match intent {
        FlowIntent::Login => println!("✓ Signed in as {}", display_name(identity)),
        FlowIntent::SignUp => println!("✓ Account created for {}", display_name(identity)),
    }
}

pub async fn interactive(config: &Config, intent: FlowIntent, channel: ChannelKind) -> Result<()> {
    let host = Arc::new(HostedChallenge::new(config.challenge.clone()));
    let (mut orch, mut notices) = build_orchestrator(config, host, intent)?;

    settle(&mut orch, &mut notices).await?;

    let session = orch.state.session.current();
    if let Some(identity) = session.identity() {
        println!("Already signed in as {}.", display_name(identity));
        return Ok(());
    }

    match channel {
        ChannelKind::Email => email_flow(&mut orch, &mut notices, intent).await,
        ChannelKind::Phone => phone_flow(&mut orch, &mut notices, intent).await,
    }
}

async fn email_flow(
    orch: &mut CliOrchestrator,
    notices: &mut NoticeReceiver,
    intent: FlowIntent,
) -> Result<()> {
    orch.handle(AuthEvent::ChannelSelected {
        channel: Some(ChannelKind::Email),
    });

    loop {
        let Some(email) = prompt("Email")? else {
            println!("Aborted.");
            return Ok(());
        };
        let Some(password) = prompt("Password")? else {
            println!("Aborted.");
            return Ok(());
        };

        orch.handle(AuthEvent::EmailCredentialChanged { email, password });
        if !orch.state.submit_enabled() {
            eprintln!(
                "Enter a well-formed email address and a password of at least {} characters.",
                validate::MIN_PASSWORD_LEN
            );
            continue;
        }

        orch.handle(AuthEvent::SubmitEmail);
        if !orch.state.flow.submission.is_pending() {
            continue;
        }

        let outcome = wait_for_event(orch, notices, |event| match event {
            AuthEvent::SignInResult { result, .. } => Some(result.clone()),
            _ => None,
        })
        .await?;

        if let Ok(identity) = outcome {
            await_signed_in(orch, notices).await?;
            report_signed_in(intent, &identity);
            return Ok(());
        }
        // Rejected; the notice is already on screen. Ask again.
    }
}

async fn phone_flow(
    orch: &mut CliOrchestrator,
    notices: &mut NoticeReceiver,
    intent: FlowIntent,
) -> Result<()> {
    'channel: loop {
        // Selecting the channel attaches a fresh verification widget.
        orch.handle(AuthEvent::ChannelSelected {
            channel: Some(ChannelKind::Phone),
        });

        let phone_number = loop {
            let Some(input) = prompt("Phone number")? else {
                println!("Aborted.");
                return Ok(());
            };
            if validate::phone_number_present(&input) {
                break input;
            }
            eprintln!("Enter a phone number in E.164 format, e.g. +15551234567.");
        };
        orch.handle(AuthEvent::PhoneNumberChanged { phone_number });

        println!("Complete the verification challenge in your browser.");
        pump_until(orch, notices, |state| match &state.flow.channel {
            ActiveChannel::Phone(_, handle) => {
                !matches!(handle.status, ChallengeStatus::Unresolved)
            }
            _ => true,
        })
        .await?;

        let expired = matches!(
            &orch.state.flow.channel,
            ActiveChannel::Phone(_, handle) if matches!(handle.status, ChallengeStatus::Expired)
        );
        if expired {
            // The expiry notice told the user to re-verify.
            continue 'channel;
        }

        orch.handle(AuthEvent::SubmitPhone);
        if !orch.state.flow.submission.is_pending() {
            continue 'channel;
        }
        let sent = wait_for_event(orch, notices, |event| match event {
            AuthEvent::VerificationSent { result, .. } => Some(result.is_ok()),
            _ => None,
        })
        .await?;
        if !sent {
            // Send failed; restart verification with a fresh widget.
            continue 'channel;
        }

        loop {
            let Some(code) = prompt("Code")? else {
                println!("Aborted.");
                return Ok(());
            };
            orch.handle(AuthEvent::OtpCodeChanged { code });
            orch.handle(AuthEvent::ConfirmOtp);
            if !orch.state.flow.submission.is_pending() {
                // Blank code never left the terminal. Ask again.
                continue;
            }

            let outcome = wait_for_event(orch, notices, |event| match event {
                AuthEvent::OtpConfirmResult { result, .. } => Some(result.clone()),
                _ => None,
            })
            .await?;

            match outcome {
                Ok(identity) => {
                    await_signed_in(orch, notices).await?;
                    report_signed_in(intent, &identity);
                    return Ok(());
                }
                // The code entry is consumed either way; re-verify.
                Err(_) => continue 'channel,
            }
        }
    }
}

pub async fn federated(config: &Config) -> Result<()> {
    let host = Arc::new(NoopChallengeHost);
    let (mut orch, mut notices) = build_orchestrator(config, host, FlowIntent::Login)?;

    settle(&mut orch, &mut notices).await?;

    let session = orch.state.session.current();
    if let Some(identity) = session.identity() {
        println!("Already signed in as {}.", display_name(identity));
        return Ok(());
    }

    println!("To sign in with your federated account:");
    println!();
    println!("  1. A browser window will open with the provider's sign-in page");
    println!("  2. Sign in and authorize access");
    println!("  3. Return here once the browser shows the confirmation page");
    println!();

    orch.handle(AuthEvent::SubmitFederated);
    if !orch.state.flow.submission.is_pending() {
        anyhow::bail!("Federated sign-in did not start");
    }

    let outcome = wait_for_event(&mut orch, &mut notices, |event| match event {
        AuthEvent::FederatedResult { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await?;

    match outcome {
        Ok(identity) => {
            await_signed_in(&mut orch, &mut notices).await?;
            report_signed_in(FlowIntent::Login, &identity);
            Ok(())
        }
        Err(_) => {
            // The failure notice is already on stderr.
            std::process::exit(1);
        }
    }
}

pub fn logout() -> Result<()> {
    let had_session = cache::clear()?;

    if had_session {
        println!("✓ Signed out");
        println!("  Session removed from: {}", cache::cache_path().display());
    } else {
        println!("Not signed in (no cached session).");
    }

    Ok(())
}
