use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::{from_unix_millis, Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::Error;
use crate::http::{HttpService, HttpTransport, RequestOptions};
use crate::notify::Notifier;
use crate::session::company::CompanyContext;
use crate::session::engine::SessionEngine;
use crate::session::interceptor::AuthenticatedTransport;
use crate::session::status::TokenStatus;
use crate::session::Navigator;
use crate::store::{self, keys, SessionStore};
use crate::types::{
    Company, CompanyId, LoginRequest, LoginResponse, RegisterRequest, Session, StoredUser,
    TokenResponse, UserId, UserResponse,
};

/// What a successful login led to.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// A session is established; the user is on the landing route.
    SessionEstablished(Session),
    /// The account spans several companies: a transient session token and
    /// the candidate list are stored, no session exists yet. The caller
    /// takes the user to the company picker and completes the flow with
    /// [`AuthService::exchange_company_token`].
    CompanySelectionRequired { companies: Vec<Company> },
}

/// Orchestrates login, company selection, session restore and logout, and
/// publishes the reactive session state everything else consumes.
///
/// Construct one per application; every clone of the returned watch
/// receivers sees the current value immediately, then every change.
pub struct AuthService {
    engine: Arc<SessionEngine>,
}

impl AuthService {
    /// Create the service with the system clock.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_clock(config, transport, store, notifier, navigator, Arc::new(SystemClock))
    }

    /// Create the service with an explicit [`Clock`].
    #[must_use]
    pub fn with_clock(
        config: AuthConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn SessionStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::from_engine(Arc::new(SessionEngine::new(
            config, transport, store, notifier, navigator, clock,
        )))
    }

    pub(crate) fn from_engine(engine: Arc<SessionEngine>) -> Self {
        Self { engine }
    }

    // ── Reactive state ─────────────────────────────────────────────

    /// Current session (or `None`) plus every subsequent change.
    #[must_use]
    pub fn session(&self) -> watch::Receiver<Option<Session>> {
        self.engine.session_tx.subscribe()
    }

    /// Currently selected company plus every subsequent change.
    #[must_use]
    pub fn selected_company(&self) -> watch::Receiver<Option<Company>> {
        self.engine.company_tx.subscribe()
    }

    /// Whether an authentication operation is in progress.
    #[must_use]
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.engine.loading_tx.subscribe()
    }

    /// Flips to `true` exactly once, after
    /// [`restore_session`](AuthService::restore_session) completes.
    /// Protected routes must not render before that.
    #[must_use]
    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.engine.initialized_tx.subscribe()
    }

    /// Token lifecycle status for status displays.
    #[must_use]
    pub fn token_status(&self) -> watch::Receiver<TokenStatus> {
        self.engine.status_tx.subscribe()
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.engine.session_tx.borrow().clone()
    }

    /// Stored access token, if a non-empty one is present.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.engine.stored_access_token()
    }

    /// True iff a session exists and holds a non-empty access token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.engine
            .session_tx
            .borrow()
            .as_ref()
            .is_some_and(|session| !session.token.is_empty())
    }

    /// Read layer over the selected-company state.
    #[must_use]
    pub fn company_context(&self) -> CompanyContext {
        CompanyContext::from_engine(Arc::clone(&self.engine))
    }

    /// The transport application requests should go through: bearer
    /// injection, coordinated renewal on 401, replay.
    #[must_use]
    pub fn authenticated_transport(&self) -> Arc<dyn HttpTransport> {
        Arc::new(AuthenticatedTransport::new(
            Arc::clone(&self.engine.transport),
            Arc::clone(&self.engine),
        ))
    }

    /// Request client for application components, wired through
    /// [`authenticated_transport`](AuthService::authenticated_transport).
    #[must_use]
    pub fn http(&self) -> HttpService {
        HttpService::new(self.authenticated_transport(), Arc::clone(&self.engine.notifier))
    }

    // ── Flows ──────────────────────────────────────────────────────

    /// Signs the user in and branches on the account's companies.
    ///
    /// The generic error notification is suppressed: a `401` (bad
    /// credentials) or `429` is returned for the caller to present.
    ///
    /// # Errors
    ///
    /// [`Error::Api`] with the server's status for declined credentials,
    /// [`Error::AuthData`] when a required response field is missing,
    /// [`Error::Connection`]/[`Error::Decode`] for transport problems.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<LoginOutcome, Error> {
        self.engine.set_loading(true);
        let result = self.login_inner(credentials).await;
        self.engine.set_loading(false);
        result
    }

    async fn login_inner(&self, credentials: &LoginRequest) -> Result<LoginOutcome, Error> {
        let engine = &self.engine;
        debug!(user = %credentials.user_name, "signing in");

        let url = engine.endpoint(&engine.config.login_path)?;
        let body = serde_json::to_value(credentials).map_err(|e| Error::Decode(e.to_string()))?;
        let response: LoginResponse =
            engine.http.post(url, Some(body), RequestOptions::silent()).await?;

        match response.empresas.len() {
            0 => self.complete_login(response, None),
            1 => {
                let company = response.empresas[0].clone();
                self.complete_login(response, Some(company))
            }
            _ => self.defer_company_selection(response),
        }
    }

    /// Zero- and single-company branch: the response must carry a final
    /// token, and the session (plus company, if any) is established in one
    /// step — no second round trip.
    fn complete_login(
        &self,
        response: LoginResponse,
        company: Option<Company>,
    ) -> Result<LoginOutcome, Error> {
        let engine = &self.engine;
        if response.token.is_empty() {
            return Err(engine.auth_data_error("Login response did not include an access token."));
        }

        match &company {
            Some(company) => {
                if let Ok(raw) = serde_json::to_string(&[company.clone()]) {
                    engine.store.write(keys::COMPANY_LIST, &raw);
                }
            }
            None => engine.store.remove(keys::COMPANY_LIST),
        }

        let session = Session {
            user_id: response.user_id,
            user_name: response.user_name,
            role: response.role,
            name: response.name.clone(),
            last_name: response.last_name,
            token: response.token,
            company_id: company.as_ref().map(|c| c.id),
        };
        engine.establish_session(session.clone(), company.clone(), response.refresh_token);
        engine.navigator.navigate(engine.config.landing_route());

        match company {
            Some(company) => {
                info!(user_id = %session.user_id, company_id = %company.id, "signed in");
                engine.notifier.success(
                    &format!("Welcome, {}. You are working in {}.", response.name, company.name),
                    None,
                );
            }
            None => {
                info!(user_id = %session.user_id, "signed in without a company");
                engine.notifier.success(&format!("Welcome, {}.", response.name), None);
            }
        }
        Ok(LoginOutcome::SessionEstablished(session))
    }

    /// Multi-company branch: persist the transient session token and the
    /// candidate list, establish nothing. The caller navigates to the
    /// company picker.
    fn defer_company_selection(&self, response: LoginResponse) -> Result<LoginOutcome, Error> {
        let engine = &self.engine;
        if response.session_token.is_empty() {
            return Err(engine.auth_data_error("Login response did not include a session token."));
        }

        engine.store.write(keys::SESSION_TOKEN, &response.session_token);
        let stored = StoredUser {
            user_id: response.user_id,
            user_name: response.user_name,
            role: response.role,
            name: response.name.clone(),
            last_name: response.last_name,
            empresa_id: None,
        };
        if let Ok(raw) = serde_json::to_string(&stored) {
            engine.store.write(keys::USER_DATA, &raw);
        }
        if let Ok(raw) = serde_json::to_string(&response.empresas) {
            engine.store.write(keys::COMPANY_LIST, &raw);
        }

        info!(user_id = %response.user_id, companies = response.empresas.len(), "company selection pending");
        engine
            .notifier
            .success(&format!("Welcome, {}. Please select a company.", response.name), None);
        Ok(LoginOutcome::CompanySelectionRequired { companies: response.empresas })
    }

    /// Completes a multi-company login by exchanging the transient session
    /// token for a real token pair bound to the chosen company.
    ///
    /// # Errors
    ///
    /// [`Error::AuthData`] immediately — without a network call — when
    /// `session_token` is empty; otherwise the exchange endpoint's errors.
    pub async fn exchange_company_token(
        &self,
        user_id: UserId,
        company_id: CompanyId,
        session_token: &str,
    ) -> Result<Session, Error> {
        if session_token.is_empty() {
            return Err(self
                .engine
                .auth_data_error("Company selection expired. Please sign in again."));
        }
        self.engine.set_loading(true);
        let result = self.exchange_inner(user_id, company_id, session_token).await;
        self.engine.set_loading(false);
        result
    }

    async fn exchange_inner(
        &self,
        user_id: UserId,
        company_id: CompanyId,
        session_token: &str,
    ) -> Result<Session, Error> {
        let engine = &self.engine;
        let url = engine.endpoint(&engine.config.exchange_path)?;
        let options = RequestOptions::default()
            .with_param("userId", user_id)
            .with_param("empresaId", company_id)
            .with_param("sessionToken", session_token);
        let response: TokenResponse = engine.http.post(url, None, options).await?;
        if response.token.is_empty() {
            return Err(
                engine.auth_data_error("Token exchange did not include an access token.")
            );
        }

        let Some(stored) = engine
            .store
            .read(keys::USER_DATA)
            .and_then(|raw| serde_json::from_str::<StoredUser>(&raw).ok())
        else {
            return Err(engine.auth_data_error("No pending sign-in found. Please sign in again."));
        };

        let company =
            engine.available_companies().into_iter().find(|company| company.id == company_id);
        let mut session = stored.into_session(response.token);
        session.company_id = Some(company_id);

        engine.establish_session(session.clone(), company.clone(), response.refresh_token);
        engine.navigator.navigate(engine.config.landing_route());

        info!(user_id = %user_id, company_id = %company_id, "company selected, session established");
        match company {
            Some(company) => engine.notifier.success(
                &format!("Welcome, {}. You are working in {}.", session.name, company.name),
                None,
            ),
            None => engine.notifier.success(&format!("Welcome, {}.", session.name), None),
        }
        Ok(session)
    }

    /// Restores a persisted session at startup, before the UI becomes
    /// interactive.
    ///
    /// If only the refresh token is still alive the access token is renewed
    /// first. Missing data, unparseable data or an expired refresh token
    /// clear the storage silently and leave the application signed out —
    /// never an error, never a notification. Flips
    /// [`initialized`](AuthService::initialized) exactly once.
    pub async fn restore_session(&self) {
        if *self.engine.initialized_tx.borrow() {
            return;
        }
        self.restore_inner().await;
        self.engine.initialized_tx.send_replace(true);
    }

    async fn restore_inner(&self) {
        let engine = &self.engine;
        let store = &*engine.store;

        let Some(raw_user) = store.read(keys::USER_DATA) else {
            engine.clear_session(false);
            return;
        };
        let access_token = engine.stored_access_token();
        let refresh_token = store.read(keys::REFRESH_TOKEN).filter(|t| !t.is_empty());
        if access_token.is_none() && refresh_token.is_none() {
            engine.clear_session(false);
            return;
        }

        let now = engine.clock.now_millis();
        if let Some(refresh_expiry) = store::read_millis(store, keys::REFRESH_EXPIRY) {
            if now >= refresh_expiry {
                debug!("stored refresh token expired, discarding session");
                engine.clear_session(false);
                return;
            }
        }

        let Ok(stored_user) = serde_json::from_str::<StoredUser>(&raw_user) else {
            warn!("stored session data unreadable, discarding");
            engine.clear_session(false);
            return;
        };

        let access_valid = access_token.is_some()
            && store::read_millis(store, keys::ACCESS_EXPIRY).is_some_and(|expiry| now < expiry);

        let token = match (access_token, refresh_token) {
            (Some(token), _) if access_valid => token,
            (_, Some(_)) => {
                debug!("access token stale, renewing before restore");
                match engine.renew_token(false).await {
                    Ok(token) => token,
                    // Renewal already cleared the storage silently.
                    Err(_) => return,
                }
            }
            _ => {
                engine.clear_session(false);
                return;
            }
        };

        let session = stored_user.into_session(token);
        let company = store
            .read(keys::SELECTED_COMPANY)
            .and_then(|raw| serde_json::from_str::<Company>(&raw).ok());

        info!(user_id = %session.user_id, "session restored");
        engine.session_tx.send_replace(Some(session));
        engine.company_tx.send_replace(company);

        let refresh_expiry = store::read_millis(store, keys::REFRESH_EXPIRY);
        let access_expiry = store::read_millis(store, keys::ACCESS_EXPIRY);
        if let Some(hard_expiry) = refresh_expiry.or(access_expiry) {
            let threshold = engine.config.refresh_threshold_ms();
            engine.update_status(|status| {
                status.session_time_remaining = hard_expiry - now;
                status.next_refresh = access_expiry.and_then(|e| from_unix_millis(e - threshold));
            });
        }
        engine.start_lifecycle();
    }

    /// Signs the user out: stops the lifecycle timer, clears all persisted
    /// session data and published state, navigates to the login route.
    ///
    /// Idempotent and silent — safe to call with no session.
    pub fn logout(&self) {
        info!("signing out");
        self.engine.clear_session(true);
    }

    /// Switches to `company` without a network call: persists the choice,
    /// publishes it, and mirrors the id into the session.
    pub fn select_company(&self, company: &Company) {
        let engine = &self.engine;
        if let Ok(raw) = serde_json::to_string(company) {
            engine.store.write(keys::SELECTED_COMPANY, &raw);
        }
        engine.company_tx.send_replace(Some(company.clone()));
        engine.session_tx.send_modify(|session| {
            if let Some(session) = session {
                session.company_id = Some(company.id);
            }
        });
        debug!(company_id = %company.id, "company switched");
    }

    /// Candidate companies persisted at login, or empty.
    #[must_use]
    pub fn available_companies(&self) -> Vec<Company> {
        self.engine.available_companies()
    }

    /// Asks the API whether the stored access token is still accepted.
    /// Any failure — including having no token — is `false`.
    pub async fn validate_token(&self) -> bool {
        let engine = &self.engine;
        let Some(token) = engine.stored_access_token() else {
            return false;
        };
        let Ok(url) = engine.endpoint(&engine.config.validate_path) else {
            return false;
        };
        engine
            .http
            .get::<bool>(url, RequestOptions::silent().with_bearer(&token))
            .await
            .unwrap_or(false)
    }

    /// Registers a new user. Failures raise the generic error notification.
    ///
    /// # Errors
    ///
    /// The register endpoint's errors, mapped to user messages.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<UserResponse, Error> {
        self.engine.set_loading(true);
        let result = self.register_inner(registration).await;
        self.engine.set_loading(false);
        result
    }

    async fn register_inner(&self, registration: &RegisterRequest) -> Result<UserResponse, Error> {
        let engine = &self.engine;
        let url = engine.endpoint(&engine.config.register_path)?;
        let body =
            serde_json::to_value(registration).map_err(|e| Error::Decode(e.to_string()))?;
        let response: UserResponse =
            engine.http.post(url, Some(body), RequestOptions::default()).await?;
        info!(user_id = %response.id, "user registered");
        engine.notifier.success("User registered successfully.", None);
        Ok(response)
    }
}
