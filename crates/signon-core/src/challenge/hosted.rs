//! Browser-hosted challenge widget for the CLI surface.
//!
//! Each attach serves a one-shot verification page, opens the browser,
//! and waits for the solved token on a loopback callback. Once the
//! token arrives the widget reports `Resolved`; if its TTL elapses
//! before the flow uses it, `Expired` follows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ChallengeConfig;
use crate::providers::loopback::{self, CallbackWait};
use crate::providers::NO_BROWSER_ENV;

use super::{ChallengeHost, ChallengeSignal, ChallengeSignalSender, WidgetId};

/// Path of the locally served verification page.
const PAGE_PATH: &str = "/challenge";

/// Path the solved widget redirects to, carrying the token.
const CALLBACK_PATH: &str = "/challenge/verified";

/// How long the user gets to solve before the widget gives up.
const SOLVE_TIMEOUT: Duration = Duration::from_secs(600);

/// Challenge host that runs the widget in the user's browser.
pub struct HostedChallenge {
    config: ChallengeConfig,
    widgets: Arc<Mutex<HashMap<WidgetId, CancellationToken>>>,
}

impl HostedChallenge {
    pub fn new(config: ChallengeConfig) -> Self {
        Self {
            config,
            widgets: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl ChallengeHost for HostedChallenge {
    /// Must be called from within a tokio runtime; the widget runs as a
    /// spawned task until solved, expired, or detached.
    fn attach(&self, mount: &str, widget_id: WidgetId, signals: ChallengeSignalSender) {
        let cancel = CancellationToken::new();
        if let Ok(mut widgets) = self.widgets.lock() {
            widgets.insert(widget_id, cancel.clone());
        }

        let config = self.config.clone();
        let widgets = Arc::clone(&self.widgets);
        let mount = mount.to_string();
        tokio::spawn(async move {
            run_widget(&config, &mount, widget_id, &signals, &cancel).await;
            if let Ok(mut widgets) = widgets.lock() {
                widgets.remove(&widget_id);
            }
        });
    }

    fn detach(&self, widget_id: WidgetId) {
        if let Ok(mut widgets) = self.widgets.lock()
            && let Some(cancel) = widgets.remove(&widget_id)
        {
            debug!(%widget_id, "detaching challenge widget");
            cancel.cancel();
        }
    }
}

async fn run_widget(
    config: &ChallengeConfig,
    mount: &str,
    widget_id: WidgetId,
    signals: &ChallengeSignalSender,
    cancel: &CancellationToken,
) {
    let port = if config.callback_port == 0 {
        loopback::random_local_port()
    } else {
        config.callback_port
    };
    let state = widget_id.to_string();

    let (open_url, page) = prepare_page(config, mount, port, &state);

    // Best effort, skipped in tests; the URL lands in the log for a
    // manual open.
    if std::env::var(NO_BROWSER_ENV).is_err()
        && let Err(err) = open::that(&open_url)
    {
        warn!(%err, url = %open_url, "could not open browser for the challenge");
    }
    debug!(%widget_id, port, url = %open_url, "challenge widget waiting for resolution");

    let token = CallbackWait {
        port,
        page: page.as_deref().map(|body| (PAGE_PATH, body)),
        callback_path: CALLBACK_PATH,
        param: "token",
        expected_state: Some(&state),
        timeout: SOLVE_TIMEOUT,
        cancel: Some(cancel.clone()),
    }
    .run()
    .await;

    if cancel.is_cancelled() {
        return;
    }
    let Some(token) = token else {
        // Never solved within the window; the widget is dead.
        let _ = signals.send(ChallengeSignal::Expired { widget_id });
        return;
    };

    if signals
        .send(ChallengeSignal::Resolved { widget_id, token })
        .is_err()
    {
        return;
    }

    let Some(ttl) = config.token_ttl() else {
        return;
    };
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(ttl) => {
            debug!(%widget_id, "challenge token ttl elapsed");
            let _ = signals.send(ChallengeSignal::Expired { widget_id });
        }
    }
}

/// Builds the URL the browser opens and, when self-hosting, the page
/// body to serve.
///
/// A configured `page_url` points at a page that renders the real
/// widget and redirects to the local callback with the token. Without
/// one, the local page is a plain human gesture; production setups
/// configure `challenge.page_url`.
fn prepare_page(
    config: &ChallengeConfig,
    mount: &str,
    port: u16,
    state: &str,
) -> (String, Option<String>) {
    if let Some(page_url) = config.page_url.as_deref().filter(|url| !url.trim().is_empty()) {
        match url::Url::parse(page_url) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("mount", mount)
                    .append_pair("state", state)
                    .append_pair(
                        "redirect_uri",
                        &loopback::build_redirect_uri(port, CALLBACK_PATH),
                    );
                return (url.to_string(), None);
            }
            Err(err) => {
                warn!(%err, page_url, "invalid challenge.page_url; serving the local page");
            }
        }
    }

    let token = Uuid::new_v4().to_string();
    let body = local_page(mount, state, &token);
    (loopback::build_redirect_uri(port, PAGE_PATH), Some(body))
}

fn local_page(mount: &str, state: &str, token: &str) -> String {
    format!(
        "<html><head><title>Verification</title></head><body>\
         <div id=\"{mount}\">\
         <h3>Confirm you are human</h3>\
         <p>Continue to receive a verification code on your phone.</p>\
         <p><a href=\"{CALLBACK_PATH}?state={state}&amp;token={token}\">Continue</a></p>\
         </div></body></html>"
    )
}
