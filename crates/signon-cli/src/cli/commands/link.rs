//! Link-email command handler.

use std::sync::Arc;

use anyhow::Result;
use signon_core::challenge::NoopChallengeHost;
use signon_core::config::Config;
use signon_core::events::AuthEvent;
use signon_core::state::FlowIntent;
use signon_core::validate;

use super::auth;

pub async fn run(config: &Config, address: &str) -> Result<()> {
    if !validate::is_well_formed_email(address) {
        anyhow::bail!("'{address}' is not a well-formed email address");
    }

    let host = Arc::new(NoopChallengeHost);
    let (mut orch, mut notices) = auth::build_orchestrator(config, host, FlowIntent::Login)?;

    auth::settle(&mut orch, &mut notices).await?;

    if orch.state.session.current().identity().is_none() {
        anyhow::bail!("Not signed in. Run `signon login` first.");
    }

    orch.handle(AuthEvent::LinkEmail {
        email: address.to_string(),
    });
    if !orch.state.flow.submission.is_pending() {
        // The session flipped between the settle and the dispatch.
        anyhow::bail!("Not signed in. Run `signon login` first.");
    }

    let result = auth::wait_for_event(&mut orch, &mut notices, |event| match event {
        AuthEvent::LinkEmailResult { result, .. } => Some(result.clone()),
        _ => None,
    })
    .await?;

    if result.is_err() {
        // The failure notice is already on stderr.
        std::process::exit(1);
    }
    Ok(())
}
