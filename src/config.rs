use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Authentication configuration: API base, endpoint paths, routes, and the
/// token lifecycle timings.
///
/// The required field is a constructor parameter — no runtime "missing
/// field" errors.
///
/// ```rust,ignore
/// use tms_session::AuthConfig;
///
/// let config = AuthConfig::new("https://api.example.com".parse()?);
/// // Optional overrides via chaining:
/// let config = config
///     .with_landing_route("/home")
///     .with_retry_attempts(5);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthConfig {
    pub(crate) api_url: Url,
    pub(crate) login_path: String,
    pub(crate) validate_path: String,
    pub(crate) register_path: String,
    pub(crate) exchange_path: String,
    pub(crate) refresh_path: String,
    pub(crate) landing_route: String,
    pub(crate) login_route: String,
    pub(crate) token_lifetime: Duration,
    pub(crate) session_lifetime: Duration,
    pub(crate) check_interval: Duration,
    pub(crate) refresh_threshold: Duration,
    pub(crate) retry_attempts: u32,
    pub(crate) retry_delay: Duration,
}

impl AuthConfig {
    /// Create a configuration for the given API base URL.
    ///
    /// All optional fields use the API's defaults. Override with `with_*`
    /// methods.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            login_path: "/api/auth/login".into(),
            validate_path: "/api/auth/validate".into(),
            register_path: "/api/users/register".into(),
            exchange_path: "/api/tokens/generate".into(),
            refresh_path: "/api/tokens/refresh".into(),
            landing_route: "/dashboard".into(),
            login_route: "/auth/login".into(),
            token_lifetime: Duration::from_secs(3_600),
            session_lifetime: Duration::from_secs(86_400),
            check_interval: Duration::from_secs(1_800),
            refresh_threshold: Duration::from_secs(300),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `TMS_API_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `TMS_LANDING_ROUTE`: route after a completed sign-in
    /// - `TMS_LOGIN_ROUTE`: route for signed-out users
    /// - `TMS_TOKEN_LIFETIME_SECS`: access-token lifetime
    /// - `TMS_SESSION_LIFETIME_SECS`: refresh-token lifetime
    /// - `TMS_SESSION_CHECK_SECS`: lifecycle check interval
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `TMS_API_URL` is missing or any value
    /// fails to parse.
    pub fn from_env() -> Result<Self, Error> {
        let api_url = std::env::var("TMS_API_URL")
            .map_err(|_| Error::Config("TMS_API_URL is required".into()))?;
        let api_url: Url =
            api_url.parse().map_err(|e| Error::Config(format!("TMS_API_URL: {e}")))?;

        let mut config = Self::new(api_url);
        if let Ok(route) = std::env::var("TMS_LANDING_ROUTE") {
            config = config.with_landing_route(route);
        }
        if let Ok(route) = std::env::var("TMS_LOGIN_ROUTE") {
            config = config.with_login_route(route);
        }
        if let Some(secs) = env_secs("TMS_TOKEN_LIFETIME_SECS")? {
            config = config.with_token_lifetime(secs);
        }
        if let Some(secs) = env_secs("TMS_SESSION_LIFETIME_SECS")? {
            config = config.with_session_lifetime(secs);
        }
        if let Some(secs) = env_secs("TMS_SESSION_CHECK_SECS")? {
            config = config.with_check_interval(secs);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_validate_path(mut self, path: impl Into<String>) -> Self {
        self.validate_path = path.into();
        self
    }

    #[must_use]
    pub fn with_register_path(mut self, path: impl Into<String>) -> Self {
        self.register_path = path.into();
        self
    }

    #[must_use]
    pub fn with_exchange_path(mut self, path: impl Into<String>) -> Self {
        self.exchange_path = path.into();
        self
    }

    #[must_use]
    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    #[must_use]
    pub fn with_landing_route(mut self, route: impl Into<String>) -> Self {
        self.landing_route = route.into();
        self
    }

    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    #[must_use]
    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// API base URL.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Route after a completed sign-in.
    #[must_use]
    pub fn landing_route(&self) -> &str {
        &self.landing_route
    }

    /// Route for signed-out users.
    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Interval between lifecycle checks.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Fixed delay between refresh retries.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Maximum refresh attempts per cycle.
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Full URL for an endpoint path.
    ///
    /// The path is appended to the base URL as given, so a base of
    /// `https://host/tms` keeps its prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if base and path do not combine into a
    /// valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.api_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| Error::Config(format!("invalid endpoint URL for {path}: {e}")))
    }

    /// Whether a URL targets this application's API.
    #[must_use]
    pub fn is_api_url(&self, url: &Url) -> bool {
        url.as_str().starts_with(self.api_url.as_str().trim_end_matches('/'))
    }

    /// Whether a URL is one of the credential-exchange endpoints that must
    /// never carry a stored token (login and refresh).
    #[must_use]
    pub fn is_credential_endpoint(&self, url: &Url) -> bool {
        self.is_api_url(url) && (url.path() == self.login_path || url.path() == self.refresh_path)
    }

    pub(crate) fn token_lifetime_ms(&self) -> i64 {
        self.token_lifetime.as_millis() as i64
    }

    pub(crate) fn session_lifetime_ms(&self) -> i64 {
        self.session_lifetime.as_millis() as i64
    }

    pub(crate) fn refresh_threshold_ms(&self) -> i64 {
        self.refresh_threshold.as_millis() as i64
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, Error> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 =
                raw.parse().map_err(|_| Error::Config(format!("{name}: expected seconds")))?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig::new("https://api.example.com".parse().unwrap())
    }

    #[test]
    fn defaults_match_api_contract() {
        let config = test_config();
        assert_eq!(config.login_path, "/api/auth/login");
        assert_eq!(config.refresh_path, "/api/tokens/refresh");
        assert_eq!(config.token_lifetime, Duration::from_secs(3_600));
        assert_eq!(config.session_lifetime, Duration::from_secs(86_400));
        assert_eq!(config.check_interval, Duration::from_secs(1_800));
        assert_eq!(config.refresh_threshold, Duration::from_secs(300));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn builder_overrides() {
        let config = test_config()
            .with_landing_route("/home")
            .with_retry_attempts(5)
            .with_refresh_path("/v2/refresh");
        assert_eq!(config.landing_route(), "/home");
        assert_eq!(config.retry_attempts(), 5);
        assert_eq!(config.refresh_path, "/v2/refresh");
    }

    #[test]
    fn endpoint_keeps_base_prefix() {
        let config = AuthConfig::new("https://host.example.com/tms/".parse().unwrap());
        let url = config.endpoint("/api/auth/login").unwrap();
        assert_eq!(url.as_str(), "https://host.example.com/tms/api/auth/login");
    }

    #[test]
    fn api_url_detection() {
        let config = test_config();
        assert!(config.is_api_url(&"https://api.example.com/api/equipment".parse().unwrap()));
        assert!(!config.is_api_url(&"https://elsewhere.example.com/api".parse().unwrap()));
    }

    #[test]
    fn credential_endpoints_are_recognized() {
        let config = test_config();
        let login = config.endpoint("/api/auth/login").unwrap();
        let refresh = config.endpoint("/api/tokens/refresh").unwrap();
        let other = config.endpoint("/api/equipment").unwrap();
        assert!(config.is_credential_endpoint(&login));
        assert!(config.is_credential_endpoint(&refresh));
        assert!(!config.is_credential_endpoint(&other));
    }
}
