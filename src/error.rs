#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The API declined the request with a non-success status.
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    /// The request never produced a response (DNS, refused, timeout).
    #[error("connection error: {0}")]
    Connection(String),
    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// A required field was missing from authentication data.
    #[error("authentication data error: {0}")]
    AuthData(String),
    /// The session could not be renewed and has been terminated.
    #[error("session expired")]
    SessionExpired,
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status of the failed request, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a `401` response (bad credentials or a stale token).
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// True for a `429` response.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// Whether a token renewal that failed this way is worth retrying.
    ///
    /// Network failures, timeouts (408), rate limits (429) and server
    /// errors (5xx) are transient; everything else is terminal.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Api { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::Connection("refused".into()).is_transient());
        for status in [408, 429, 500, 502, 503, 599] {
            assert!(Error::Api { status, message: String::new() }.is_transient());
        }
        for status in [400, 401, 403, 404] {
            assert!(!Error::Api { status, message: String::new() }.is_transient());
        }
        assert!(!Error::SessionExpired.is_transient());
        assert!(!Error::AuthData("missing token".into()).is_transient());
    }

    #[test]
    fn status_helpers() {
        let unauthorized = Error::Api { status: 401, message: "no".into() };
        assert!(unauthorized.is_unauthorized());
        assert!(!unauthorized.is_rate_limited());
        assert_eq!(unauthorized.status(), Some(401));
        assert_eq!(Error::SessionExpired.status(), None);
    }
}
