use std::sync::Arc;

use tracing::debug;

use crate::error::Error;
use crate::http::{HttpRequest, HttpTransport, TransportFuture};
use crate::session::engine::SessionEngine;

/// Transport wrapper that authenticates outgoing API requests.
///
/// Attaches the stored bearer token, and on a `401` coordinates a single
/// token renewal — no matter how many requests fail at once — before
/// replaying the original request with the fresh token. Obtain one through
/// [`AuthService::authenticated_transport`](crate::AuthService::authenticated_transport)
/// so all components share the same coordination state.
///
/// Passes through unmodified: requests to other hosts, requests when no
/// token is stored, and the login and refresh endpoints themselves (a
/// credential exchange must never carry a stale token).
pub struct AuthenticatedTransport {
    inner: Arc<dyn HttpTransport>,
    engine: Arc<SessionEngine>,
}

impl AuthenticatedTransport {
    pub(crate) fn new(inner: Arc<dyn HttpTransport>, engine: Arc<SessionEngine>) -> Self {
        Self { inner, engine }
    }
}

impl HttpTransport for AuthenticatedTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let config = &self.engine.config;
            if !config.is_api_url(&request.url) || config.is_credential_endpoint(&request.url) {
                return self.inner.send(request).await;
            }
            let Some(token) = self.engine.stored_access_token() else {
                return self.inner.send(request).await;
            };

            let response = self.inner.send(request.clone().with_bearer(&token)).await?;
            if response.status != 401 {
                return Ok(response);
            }

            debug!(path = request.url.path(), "request rejected with 401, renewing token");
            match self.engine.renew_token(true).await {
                Ok(fresh) => self.inner.send(request.with_bearer(&fresh)).await,
                Err(_) => Err(Error::SessionExpired),
            }
        })
    }
}
