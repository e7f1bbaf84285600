#![doc = include_str!("../README.md")]

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod notify;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use clock::{Clock, SystemClock};
pub use config::AuthConfig;
pub use error::Error;
pub use http::{
    HttpRequest, HttpResponse, HttpService, HttpTransport, Method, ReqwestTransport,
    RequestOptions,
};
pub use notify::{Notification, NotificationHub, NotificationLevel, Notifier};
pub use session::{
    AuthService, AuthenticatedTransport, CompanyContext, CompanyContextInfo, LoginOutcome,
    Navigator, TokenStatus,
};
pub use store::{FileStore, MemoryStore, SessionStore};
pub use types::{
    Company, CompanyId, LoginRequest, LoginResponse, RegisterRequest, Session, TokenResponse,
    UserId, UserResponse,
};
