//! REST identity provider (identity-toolkit style API).

use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::providers::{
    IdentityProvider, OtpTicket, ProviderError, ProviderResult, SessionStream, USER_AGENT, cache,
    loopback, resolve_api_key, resolve_base_url,
};
use crate::session::{SessionEvent, UserIdentity};

/// Federated identity provider id forwarded to the backend.
const FEDERATED_PROVIDER_ID: &str = "google.com";
/// Local callback path for the federated redirect.
const FEDERATED_CALLBACK_PATH: &str = "/callback";
/// How long to wait for the browser round-trip.
const FEDERATED_TIMEOUT: Duration = Duration::from_secs(120);

/// REST provider configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
}

impl RestConfig {
    /// Creates a new config from environment.
    ///
    /// Authentication resolution order:
    /// 1. `config_api_key` parameter (from config file)
    /// 2. `SIGNON_API_KEY` environment variable
    ///
    /// Environment variables:
    /// - `SIGNON_API_KEY` (fallback if not in config)
    /// - `SIGNON_BASE_URL` (optional)
    ///
    /// # Errors
    /// Returns an error if no API key is available.
    pub fn from_env(config_base_url: Option<&str>, config_api_key: Option<&str>) -> Result<Self> {
        let api_key = resolve_api_key(config_api_key)?;
        let base_url = resolve_base_url(config_base_url)?;
        Ok(Self { base_url, api_key })
    }
}

/// REST identity client.
///
/// Emits ambient [`SessionEvent`]s on its stream whenever a session
/// mutation applies, and restores the cached session on construction.
pub struct RestProvider {
    http: reqwest::Client,
    config: RestConfig,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl RestProvider {
    pub fn new(config: RestConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let provider = Self {
            http: reqwest::Client::new(),
            config,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        };
        provider.restore_session();
        provider
    }

    /// Replays the cached session, if any, onto the ambient stream.
    /// The channel buffers, so this is safe before anyone subscribes.
    fn restore_session(&self) {
        self.emit(SessionEvent::Resolving);
        match cache::load() {
            Ok(Some(session)) => self.emit(SessionEvent::SignedIn(session.identity())),
            Ok(None) => self.emit(SessionEvent::SignedOut),
            Err(err) => {
                warn!("Failed to read session cache: {err:#}");
                self.emit(SessionEvent::SignedOut);
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Persists and announces a freshly authenticated session.
    fn apply_session(&self, account: AccountResponse) -> UserIdentity {
        self.emit(SessionEvent::Resolving);
        let session = cache::CachedSession::new(account.local_id, account.email, account.id_token);
        if let Err(err) = cache::save(&session) {
            warn!("Failed to persist session: {err:#}");
        }
        let identity = session.identity();
        self.emit(SessionEvent::SignedIn(identity.clone()));
        identity
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &Value,
    ) -> ProviderResult<T> {
        let url = format!(
            "{}/v1/accounts:{operation}?key={}",
            self.config.base_url, self.config.api_key
        );
        let response = self
            .http
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::unavailable(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::unavailable(format!("Invalid response: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for RestProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<UserIdentity> {
        let account: AccountResponse = self
            .post_json(
                "signInWithPassword",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.apply_session(account))
    }

    async fn create_account_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> ProviderResult<UserIdentity> {
        let account: AccountResponse = self
            .post_json(
                "signUp",
                &serde_json::json!({
                    "email": email,
                    "password": password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        Ok(self.apply_session(account))
    }

    async fn begin_federated_login(&self) -> ProviderResult<UserIdentity> {
        let port = loopback::random_local_port();
        let continue_uri = loopback::build_redirect_uri(port, FEDERATED_CALLBACK_PATH);
        let auth: AuthUriResponse = self
            .post_json(
                "createAuthUri",
                &serde_json::json!({
                    "providerId": FEDERATED_PROVIDER_ID,
                    "continueUri": continue_uri,
                }),
            )
            .await?;

        // Best effort, skipped in tests; the URL lands in the log for a
        // manual open and the callback wait still completes the flow.
        if std::env::var(super::NO_BROWSER_ENV).is_err()
            && let Err(err) = open::that(&auth.auth_uri)
        {
            warn!(%err, url = %auth.auth_uri, "could not open browser for federated login");
        }

        let code = loopback::wait_for_param(
            port,
            FEDERATED_CALLBACK_PATH,
            "code",
            None,
            FEDERATED_TIMEOUT,
        )
        .await
        .ok_or_else(|| ProviderError::rejected("Federated login was not completed."))?;

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("code", &code)
            .finish();
        let mut request = serde_json::json!({
            "requestUri": format!("{continue_uri}?{query}"),
            "returnSecureToken": true,
        });
        if let Some(session_id) = auth.session_id {
            request["sessionId"] = Value::String(session_id);
        }

        let account: AccountResponse = self.post_json("signInWithIdp", &request).await?;
        Ok(self.apply_session(account))
    }

    async fn send_verification_code(
        &self,
        phone_number: &str,
        challenge_token: &str,
    ) -> ProviderResult<OtpTicket> {
        let response: SendCodeResponse = self
            .post_json(
                "sendVerificationCode",
                &serde_json::json!({
                    "phoneNumber": phone_number,
                    "recaptchaToken": challenge_token,
                }),
            )
            .await?;
        Ok(OtpTicket {
            session_info: response.session_info,
        })
    }

    async fn confirm_verification_code(
        &self,
        ticket: &OtpTicket,
        code: &str,
    ) -> ProviderResult<UserIdentity> {
        let account: AccountResponse = self
            .post_json(
                "signInWithPhoneNumber",
                &serde_json::json!({
                    "sessionInfo": ticket.session_info,
                    "code": code,
                }),
            )
            .await?;
        Ok(self.apply_session(account))
    }

    async fn associate_email(&self, user_id: &str, email: &str) -> ProviderResult<()> {
        let session = match cache::load() {
            Ok(Some(session)) => session,
            Ok(None) => return Err(ProviderError::rejected("Not signed in.")),
            Err(err) => {
                return Err(ProviderError::unavailable(format!(
                    "Session cache unreadable: {err:#}"
                )));
            }
        };
        if session.user_id != user_id {
            return Err(ProviderError::rejected(
                "Session does not match the requested account.",
            ));
        }

        let _: Value = self
            .post_json(
                "sendOobCode",
                &serde_json::json!({
                    "requestType": "VERIFY_AND_CHANGE_EMAIL",
                    "idToken": session.id_token,
                    "newEmail": email,
                }),
            )
            .await?;
        Ok(())
    }

    fn session_events(&self) -> SessionStream {
        let taken = self.events_rx.lock().ok().and_then(|mut guard| guard.take());
        match taken {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => {
                warn!("Session events already subscribed; returning empty stream");
                stream::empty().boxed()
            }
        }
    }
}

/// Account payload shared by the password, phone and federated endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    session_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUriResponse {
    auth_uri: String,
    #[serde(default)]
    session_id: Option<String>,
}
