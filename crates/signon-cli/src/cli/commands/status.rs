//! Status command handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use signon_core::challenge::NoopChallengeHost;
use signon_core::config::Config;
use signon_core::state::FlowIntent;

use super::auth;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: &Config) -> Result<()> {
    let host = Arc::new(NoopChallengeHost);
    let (mut orch, _notices) = auth::build_orchestrator(config, host, FlowIntent::Login)?;

    let mut session_watch = orch.state.session.watch();
    tokio::spawn(async move { while orch.pump().await.is_some() {} });

    let resolved = tokio::time::timeout(
        RESOLVE_TIMEOUT,
        session_watch.wait_for(|state| !state.is_resolving()),
    )
    .await
    .context("timed out waiting for the session to resolve")?
    .context("session updates ended before the state settled")?
    .clone();

    match resolved.identity() {
        Some(identity) => {
            println!("Signed in as {}", auth::display_name(identity));
            Ok(())
        }
        None => {
            println!("Signed out.");
            std::process::exit(1);
        }
    }
}
