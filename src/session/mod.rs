//! Session machinery: authentication flows, the lifecycle timer, and the
//! outbound request authenticator.

mod auth;
mod company;
mod engine;
mod interceptor;
mod lifecycle;
mod refresh;
mod status;

pub use auth::{AuthService, LoginOutcome};
pub use company::{CompanyContext, CompanyContextInfo};
pub use interceptor::AuthenticatedTransport;
pub use status::TokenStatus;

/// Navigation seam the UI shell implements.
///
/// The session flows announce where the user should go next (landing route
/// after sign-in, login route after sign-out); the shell owns the actual
/// router.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, route: &str);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::auth::AuthService;
    use super::engine::SessionEngine;
    use super::Navigator;
    use crate::clock::testing::ManualClock;
    use crate::config::AuthConfig;
    use crate::http::testing::MockTransport;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::MemoryStore;

    /// Records every navigation for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingNavigator {
        routes: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        pub(crate) fn routes(&self) -> Vec<String> {
            self.routes.lock().expect("navigator lock").clone()
        }

        pub(crate) fn visits(&self, route: &str) -> usize {
            self.routes().iter().filter(|r| r.as_str() == route).count()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: &str) {
            self.routes.lock().expect("navigator lock").push(route.to_owned());
        }
    }

    /// Fully wired service over in-memory doubles.
    pub(crate) struct Harness {
        pub(crate) service: AuthService,
        pub(crate) engine: Arc<SessionEngine>,
        pub(crate) store: Arc<MemoryStore>,
        pub(crate) transport: Arc<MockTransport>,
        pub(crate) notifier: Arc<RecordingNotifier>,
        pub(crate) navigator: Arc<RecordingNavigator>,
        pub(crate) clock: Arc<ManualClock>,
    }

    pub(crate) fn harness() -> Harness {
        let config = AuthConfig::new("https://api.example.com".parse().expect("test url"));
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(MockTransport::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let navigator = Arc::new(RecordingNavigator::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));

        let engine = Arc::new(SessionEngine::new(
            config,
            Arc::clone(&transport) as _,
            Arc::clone(&store) as _,
            Arc::clone(&notifier) as _,
            Arc::clone(&navigator) as _,
            Arc::clone(&clock) as _,
        ));
        let service = AuthService::from_engine(Arc::clone(&engine));

        Harness { service, engine, store, transport, notifier, navigator, clock }
    }
}
