use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Default auto-dismiss time for a notification.
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 5_000;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(label)
    }
}

/// A leveled, timed message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
    /// Auto-dismiss time in milliseconds. `0` means sticky.
    pub duration_ms: u64,
}

/// Fire-and-forget notification sink.
///
/// `duration_ms` of `None` applies the sink's default; `Some(0)` makes the
/// notification sticky.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, level: NotificationLevel, message: &str, duration_ms: Option<u64>);

    fn success(&self, message: &str, duration_ms: Option<u64>) {
        self.notify(NotificationLevel::Success, message, duration_ms);
    }

    fn error(&self, message: &str, duration_ms: Option<u64>) {
        self.notify(NotificationLevel::Error, message, duration_ms);
    }

    fn warning(&self, message: &str, duration_ms: Option<u64>) {
        self.notify(NotificationLevel::Warning, message, duration_ms);
    }

    fn info(&self, message: &str, duration_ms: Option<u64>) {
        self.notify(NotificationLevel::Info, message, duration_ms);
    }

    /// Short confirmation after a successful token renewal.
    fn token_refreshed(&self) {
        self.success("Session renewed.", Some(3_000));
    }

    /// Heads-up that the session is approaching its end.
    fn session_expiring_soon(&self, minutes_remaining: i64) {
        self.warning(
            &format!("Your session will expire in about {minutes_remaining} minutes."),
            None,
        );
    }
}

/// In-process [`Notifier`] that keeps the current notification list and
/// publishes every change to subscribers.
///
/// New subscribers immediately see the current list; notifications with a
/// non-zero duration are removed again once their time is up.
pub struct NotificationHub {
    next_id: AtomicU64,
    default_duration_ms: u64,
    list: Arc<watch::Sender<Vec<Notification>>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        let (list, _) = watch::channel(Vec::new());
        Self {
            next_id: AtomicU64::new(0),
            default_duration_ms: DEFAULT_NOTIFICATION_DURATION_MS,
            list: Arc::new(list),
        }
    }

    /// Override the default auto-dismiss time.
    #[must_use]
    pub fn with_default_duration_ms(mut self, duration_ms: u64) -> Self {
        self.default_duration_ms = duration_ms;
        self
    }

    /// Current notification list plus every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.list.subscribe()
    }

    /// Snapshot of the currently visible notifications.
    #[must_use]
    pub fn current(&self) -> Vec<Notification> {
        self.list.borrow().clone()
    }

    /// Removes a notification before its timer runs out.
    pub fn dismiss(&self, id: u64) {
        self.list.send_modify(|list| list.retain(|n| n.id != id));
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationHub {
    fn notify(&self, level: NotificationLevel, message: &str, duration_ms: Option<u64>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let duration_ms = duration_ms.unwrap_or(self.default_duration_ms);
        tracing::debug!(%level, duration_ms, "notification: {message}");

        let notification = Notification { id, level, message: message.to_owned(), duration_ms };
        self.list.send_modify(|list| list.push(notification));

        if duration_ms > 0 {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let list = Arc::clone(&self.list);
                handle.spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(duration_ms)).await;
                    list.send_modify(|list| list.retain(|n| n.id != id));
                });
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_and_default_duration_applies() {
        let hub = NotificationHub::new();
        hub.success("first", None);
        hub.error("second", Some(0));

        let current = hub.current();
        assert_eq!(current.len(), 2);
        assert!(current[0].id < current[1].id);
        assert_eq!(current[0].duration_ms, DEFAULT_NOTIFICATION_DURATION_MS);
        assert_eq!(current[1].duration_ms, 0);
        assert_eq!(current[1].level, NotificationLevel::Error);
    }

    #[test]
    fn dismiss_removes_only_the_target() {
        let hub = NotificationHub::new();
        hub.info("keep", Some(0));
        hub.info("drop", Some(0));

        let drop_id = hub.current()[1].id;
        hub.dismiss(drop_id);

        let current = hub.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].message, "keep");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_notifications_auto_dismiss() {
        let hub = NotificationHub::new();
        hub.warning("going away", Some(1_000));
        hub.warning("sticky", Some(0));
        assert_eq!(hub.current().len(), 2);

        tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

        let current = hub.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].message, "sticky");
    }

    #[test]
    fn subscribers_see_current_list_immediately() {
        let hub = NotificationHub::new();
        hub.info("already there", Some(0));

        let receiver = hub.subscribe();
        assert_eq!(receiver.borrow().len(), 1);
    }
}
