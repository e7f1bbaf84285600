use time::OffsetDateTime;

/// Snapshot of the token lifecycle for status displays.
///
/// Published through [`AuthService::token_status`](crate::AuthService::token_status);
/// reset to its default on logout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenStatus {
    /// A renewal is currently in flight.
    pub is_refreshing: bool,
    /// When the access token was last renewed.
    pub last_refresh: Option<OffsetDateTime>,
    /// When the next proactive renewal is due.
    pub next_refresh: Option<OffsetDateTime>,
    /// Remaining session time in milliseconds.
    pub session_time_remaining: i64,
}
