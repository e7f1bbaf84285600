use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use crate::clock::{from_unix_millis, Clock};
use crate::config::AuthConfig;
use crate::error::Error;
use crate::http::{HttpService, HttpTransport, RequestOptions};
use crate::notify::Notifier;
use crate::session::lifecycle;
use crate::session::refresh::{GatePass, RefreshGate, RefreshOutcome};
use crate::session::status::TokenStatus;
use crate::session::Navigator;
use crate::store::{self, keys, SessionStore};
use crate::types::{Company, Session, StoredUser, TokenResponse};

/// Shared core behind [`AuthService`](crate::AuthService), the lifecycle
/// timer and the request authenticator.
///
/// Owns the persisted token state, the published reactive values and the
/// refresh coordination; all three components hold an `Arc` to one
/// instance, so there is exactly one refresh gate per session.
pub(crate) struct SessionEngine {
    pub(crate) config: AuthConfig,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) transport: Arc<dyn HttpTransport>,
    /// Requests issued by the auth flows themselves — over the raw
    /// transport, so a credential exchange never loops back through the
    /// request authenticator.
    pub(crate) http: HttpService,
    pub(crate) session_tx: watch::Sender<Option<Session>>,
    pub(crate) company_tx: watch::Sender<Option<Company>>,
    pub(crate) loading_tx: watch::Sender<bool>,
    pub(crate) initialized_tx: watch::Sender<bool>,
    pub(crate) status_tx: watch::Sender<TokenStatus>,
    pub(crate) gate: RefreshGate,
    lifecycle_stop: Mutex<Option<CancellationToken>>,
}

impl SessionEngine {
    pub(crate) fn new(
        config: AuthConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let http = HttpService::new(Arc::clone(&transport), Arc::clone(&notifier));
        Self {
            config,
            store,
            notifier,
            navigator,
            clock,
            transport,
            http,
            session_tx: watch::Sender::new(None),
            company_tx: watch::Sender::new(None),
            loading_tx: watch::Sender::new(false),
            initialized_tx: watch::Sender::new(false),
            status_tx: watch::Sender::new(TokenStatus::default()),
            gate: RefreshGate::new(),
            lifecycle_stop: Mutex::new(None),
        }
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.config.endpoint(path)
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.loading_tx.send_replace(loading);
    }

    pub(crate) fn update_status(&self, apply: impl FnOnce(&mut TokenStatus)) {
        self.status_tx.send_modify(apply);
    }

    /// Stored access token, if a non-empty one is present.
    pub(crate) fn stored_access_token(&self) -> Option<String> {
        self.store.read(keys::ACCESS_TOKEN).filter(|t| !t.is_empty())
    }

    /// Candidate companies persisted at login, or empty.
    pub(crate) fn available_companies(&self) -> Vec<Company> {
        self.store
            .read(keys::COMPANY_LIST)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Reports an authentication-data problem and returns it as an error.
    pub(crate) fn auth_data_error(&self, message: &str) -> Error {
        self.notifier.error(message, None);
        Error::AuthData(message.to_owned())
    }

    // ── Session state ──────────────────────────────────────────────

    /// Persists a freshly issued session and starts the lifecycle timer.
    ///
    /// Computes and stores the token expiries, resets the per-login warning
    /// flags, publishes the session and company values.
    pub(crate) fn establish_session(
        self: &Arc<Self>,
        session: Session,
        company: Option<Company>,
        refresh_token: Option<String>,
    ) {
        let now = self.clock.now_millis();
        let store = &*self.store;

        store.write(keys::ACCESS_TOKEN, &session.token);
        if let Ok(raw) = serde_json::to_string(&StoredUser::from(&session)) {
            store.write(keys::USER_DATA, &raw);
        }
        store.write(keys::LOGIN_TIMESTAMP, &now.to_string());
        store.remove(keys::SESSION_TOKEN);

        // Each warning tier may fire again for this login.
        store.remove(keys::WARNING_INFO);
        store.remove(keys::WARNING_WARNING);
        store.remove(keys::WARNING_CRITICAL);

        let refresh_expiry = match refresh_token.filter(|t| !t.is_empty()) {
            Some(token) => {
                let expiry = now + self.config.session_lifetime_ms();
                store.write(keys::REFRESH_TOKEN, &token);
                store.write(keys::REFRESH_EXPIRY, &expiry.to_string());
                Some(expiry)
            }
            None => {
                store.remove(keys::REFRESH_TOKEN);
                store.remove(keys::REFRESH_EXPIRY);
                None
            }
        };
        let access_expiry = self.persist_access_expiry(now, refresh_expiry);

        match &company {
            Some(company) => {
                if let Ok(raw) = serde_json::to_string(company) {
                    store.write(keys::SELECTED_COMPANY, &raw);
                }
            }
            None => store.remove(keys::SELECTED_COMPANY),
        }

        self.session_tx.send_replace(Some(session));
        self.company_tx.send_replace(company);

        let threshold = self.config.refresh_threshold_ms();
        self.status_tx.send_replace(TokenStatus {
            is_refreshing: false,
            last_refresh: None,
            next_refresh: from_unix_millis(access_expiry - threshold),
            session_time_remaining: refresh_expiry.unwrap_or(access_expiry) - now,
        });

        self.start_lifecycle();
    }

    /// Access-token expiry is capped at the refresh-token expiry: once the
    /// refresh token dies the session dies with it.
    fn persist_access_expiry(&self, now: i64, refresh_expiry: Option<i64>) -> i64 {
        let mut access_expiry = now + self.config.token_lifetime_ms();
        if let Some(refresh_expiry) = refresh_expiry {
            access_expiry = access_expiry.min(refresh_expiry);
        }
        self.store.write(keys::ACCESS_EXPIRY, &access_expiry.to_string());
        access_expiry
    }

    /// Tears down the session: timer, persisted keys, published values.
    /// Safe to call with no session present.
    pub(crate) fn clear_session(&self, navigate: bool) {
        self.stop_lifecycle();
        store::clear_session_keys(&*self.store);
        self.session_tx.send_replace(None);
        self.company_tx.send_replace(None);
        self.status_tx.send_replace(TokenStatus::default());
        if navigate {
            self.navigator.navigate(self.config.login_route());
        }
    }

    /// Logout the user did not ask for; always says why first.
    pub(crate) fn force_logout(&self, reason: &str) {
        self.notifier.info(reason, None);
        self.clear_session(true);
    }

    pub(crate) fn start_lifecycle(self: &Arc<Self>) {
        let stop = CancellationToken::new();
        if let Some(previous) =
            self.lifecycle_stop.lock().expect("lifecycle lock").replace(stop.clone())
        {
            previous.cancel();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let engine = Arc::clone(self);
                handle.spawn(async move { lifecycle::run(engine, stop).await });
            }
            Err(_) => warn!("no async runtime; session lifecycle timer not started"),
        }
    }

    pub(crate) fn stop_lifecycle(&self) {
        if let Some(stop) = self.lifecycle_stop.lock().expect("lifecycle lock").take() {
            stop.cancel();
        }
    }

    // ── Token renewal ──────────────────────────────────────────────

    /// Obtains a fresh access token, coordinating concurrent callers.
    ///
    /// Exactly one caller runs the renewal; the rest await its outcome.
    /// `interactive` controls the user-visible side of a failure: the
    /// startup restore clears silently, everything else notifies and
    /// navigates to the login route.
    pub(crate) async fn renew_token(&self, interactive: bool) -> Result<String, Error> {
        match self.gate.begin() {
            GatePass::Leader => {
                self.update_status(|status| status.is_refreshing = true);
                let result = self.refresh_with_retry(interactive).await;
                self.update_status(|status| status.is_refreshing = false);
                match &result {
                    Ok(token) => self.gate.finish(RefreshOutcome::Refreshed(token.clone())),
                    Err(_) => self.gate.finish(RefreshOutcome::Failed),
                }
                result
            }
            GatePass::Follower(mut outcome) => match outcome.recv().await {
                Ok(RefreshOutcome::Refreshed(token)) => Ok(token),
                _ => Err(Error::SessionExpired),
            },
        }
    }

    /// Renewal with bounded fixed-delay retries on transient failures.
    ///
    /// The attempt counter lives on the stack, so every cycle starts at
    /// zero no matter how the previous one ended.
    async fn refresh_with_retry(&self, interactive: bool) -> Result<String, Error> {
        let attempts = self.config.retry_attempts().max(1);
        for attempt in 1..=attempts {
            match self.refresh_once().await {
                Ok(token) => {
                    if interactive {
                        self.notifier.token_refreshed();
                    }
                    return Ok(token);
                }
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(attempt, max = attempts, error = %err, "session renewal failed, retrying");
                    if interactive {
                        self.notifier.info(
                            &format!("Renewing your session failed, retrying ({attempt}/{attempts})."),
                            None,
                        );
                    }
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(err) => {
                    error!(error = %err, "session renewal failed");
                    if interactive {
                        let reason = if err.is_transient() {
                            "Your session could not be renewed. Please sign in again."
                        } else {
                            "Your session has expired. Please sign in again."
                        };
                        self.force_logout(reason);
                    } else {
                        self.clear_session(false);
                    }
                    return Err(Error::SessionExpired);
                }
            }
        }
        Err(Error::SessionExpired)
    }

    /// One renewal round trip against the refresh endpoint.
    async fn refresh_once(&self) -> Result<String, Error> {
        let bearer = self
            .store
            .read(keys::REFRESH_TOKEN)
            .filter(|t| !t.is_empty())
            .or_else(|| self.stored_access_token())
            .ok_or_else(|| Error::AuthData("no credential available to renew".into()))?;

        let url = self.endpoint(&self.config.refresh_path)?;
        let response: TokenResponse =
            self.http.post(url, None, RequestOptions::silent().with_bearer(&bearer)).await?;
        if response.token.is_empty() {
            return Err(Error::AuthData("refresh response missing an access token".into()));
        }

        let now = self.clock.now_millis();
        self.store.write(keys::ACCESS_TOKEN, &response.token);

        let refresh_expiry = match response.refresh_token.as_deref() {
            // Rotated refresh token: its lifetime starts over.
            Some(rotated) if !rotated.is_empty() => {
                let expiry = now + self.config.session_lifetime_ms();
                self.store.write(keys::REFRESH_TOKEN, rotated);
                self.store.write(keys::REFRESH_EXPIRY, &expiry.to_string());
                Some(expiry)
            }
            _ => store::read_millis(&*self.store, keys::REFRESH_EXPIRY),
        };
        let access_expiry = self.persist_access_expiry(now, refresh_expiry);

        self.session_tx.send_modify(|session| {
            if let Some(session) = session {
                session.token = response.token.clone();
            }
        });

        let threshold = self.config.refresh_threshold_ms();
        self.update_status(|status| {
            status.last_refresh = from_unix_millis(now);
            status.next_refresh = from_unix_millis(access_expiry - threshold);
        });

        debug!("access token renewed");
        Ok(response.token)
    }
}
