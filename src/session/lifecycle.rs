//! Background session lifecycle: expiry enforcement, escalating warnings,
//! proactive token renewal.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::from_unix_millis;
use crate::session::engine::SessionEngine;
use crate::store::{self, keys};

/// Remaining-time thresholds for the escalating expiry notices.
const INFO_THRESHOLD_MS: i64 = 30 * 60 * 1_000;
const WARNING_THRESHOLD_MS: i64 = 15 * 60 * 1_000;
const CRITICAL_THRESHOLD_MS: i64 = 5 * 60 * 1_000;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    /// The session ended; the timer must stop.
    Expired,
}

/// Timer loop, one per established session. Runs until the session expires
/// or `stop` is cancelled (logout, replacement by a new login).
pub(crate) async fn run(engine: Arc<SessionEngine>, stop: CancellationToken) {
    debug!("session lifecycle timer started");
    let period = engine.config.check_interval();
    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                debug!("session lifecycle timer stopped");
                return;
            }
            _ = tokio::time::sleep(period) => {}
        }
        if tick(&engine).await == TickOutcome::Expired {
            return;
        }
    }
}

/// One lifecycle check.
///
/// In order: hard expiry, observer status, warning tiers, proactive
/// renewal. A tick that lands while a renewal is already in flight still
/// evaluates warnings but does not start a second renewal.
pub(crate) async fn tick(engine: &Arc<SessionEngine>) -> TickOutcome {
    let now = engine.clock.now_millis();
    let access_expiry = store::read_millis(&*engine.store, keys::ACCESS_EXPIRY);
    let refresh_expiry = store::read_millis(&*engine.store, keys::REFRESH_EXPIRY);

    let Some(hard_expiry) = refresh_expiry.or(access_expiry) else {
        // Session was torn down underneath the timer.
        return TickOutcome::Expired;
    };

    if now >= hard_expiry {
        info!("session lifetime elapsed, signing out");
        engine.force_logout("Your session has expired. Please sign in again.");
        return TickOutcome::Expired;
    }

    let remaining = hard_expiry - now;
    let threshold = engine.config.refresh_threshold_ms();
    engine.update_status(|status| {
        status.session_time_remaining = remaining;
        status.next_refresh = access_expiry.and_then(|e| from_unix_millis(e - threshold));
    });

    evaluate_warnings(engine, remaining);

    if let Some(access_expiry) = access_expiry {
        if now >= access_expiry - threshold && !engine.gate.is_refreshing() {
            debug!(remaining_ms = remaining, "access token near expiry, renewing");
            let _ = engine.renew_token(true).await;
        }
    }

    TickOutcome::Continue
}

/// Fires at most one expiry notice per tick, most severe tier first; each
/// tier fires at most once per login, guarded by its persisted flag.
fn evaluate_warnings(engine: &SessionEngine, remaining_ms: i64) {
    let minutes = (remaining_ms + 59_999) / 60_000;
    let tiers: [(i64, &str, fn(&SessionEngine, i64)); 3] = [
        (CRITICAL_THRESHOLD_MS, keys::WARNING_CRITICAL, notify_critical),
        (WARNING_THRESHOLD_MS, keys::WARNING_WARNING, notify_warning),
        (INFO_THRESHOLD_MS, keys::WARNING_INFO, notify_info),
    ];

    for (threshold, flag, fire) in tiers {
        if remaining_ms > threshold || engine.store.read(flag).is_some() {
            continue;
        }
        engine.store.write(flag, &engine.clock.now_millis().to_string());
        fire(engine, minutes);
        break;
    }
}

fn notify_critical(engine: &SessionEngine, _minutes: i64) {
    engine.notifier.error(
        "Your session is about to expire. Save your work and sign in again.",
        Some(0),
    );
}

fn notify_warning(engine: &SessionEngine, minutes: i64) {
    engine.notifier.session_expiring_soon(minutes);
}

fn notify_info(engine: &SessionEngine, minutes: i64) {
    engine.notifier.info(&format!("Your session will expire in about {minutes} minutes."), None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLevel;
    use crate::session::testing::{harness, Harness};
    use crate::store::SessionStore;
    use crate::types::{Session, UserId};

    const HOUR_MS: i64 = 3_600_000;
    const DAY_MS: i64 = 86_400_000;

    fn session(token: &str) -> Session {
        Session {
            user_id: UserId(1),
            user_name: "driver".into(),
            role: "admin".into(),
            name: "Dana".into(),
            last_name: "Reyes".into(),
            token: token.into(),
            company_id: None,
        }
    }

    #[tokio::test]
    async fn expired_refresh_token_ends_the_session() {
        let Harness { engine, store, clock, notifier, navigator, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));

        clock.set(DAY_MS + 1);
        assert_eq!(tick(&engine).await, TickOutcome::Expired);

        assert_eq!(store.read(keys::ACCESS_TOKEN), None);
        assert_eq!(notifier.count_containing("session has expired"), 1);
        assert_eq!(navigator.visits("/auth/login"), 1);
    }

    #[tokio::test]
    async fn each_warning_tier_fires_exactly_once() {
        let Harness { engine, clock, notifier, transport, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));
        // keep proactive renewal out of the way for this test
        transport.respond_always(200, r#"{"token":"T2"}"#);

        // 20 minutes remaining: info tier, repeatedly.
        clock.set(DAY_MS - 20 * 60_000);
        for _ in 0..3 {
            assert_eq!(tick(&engine).await, TickOutcome::Continue);
        }
        assert_eq!(notifier.count_containing("expire in about"), 1);

        // 10 minutes remaining: warning tier once.
        clock.set(DAY_MS - 10 * 60_000);
        for _ in 0..3 {
            tick(&engine).await;
        }
        assert_eq!(notifier.count_level(NotificationLevel::Warning), 1);

        // 4 minutes remaining: critical tier once.
        clock.set(DAY_MS - 4 * 60_000);
        for _ in 0..3 {
            tick(&engine).await;
        }
        assert_eq!(notifier.count_containing("about to expire"), 1);
    }

    #[tokio::test]
    async fn at_most_one_tier_fires_per_tick() {
        let Harness { engine, clock, notifier, transport, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));
        transport.respond_always(200, r#"{"token":"T2"}"#);

        // Jump straight into the critical window with no tier fired yet.
        clock.set(DAY_MS - 4 * 60_000);
        tick(&engine).await;

        assert_eq!(notifier.count_containing("about to expire"), 1);
        assert_eq!(notifier.count_level(NotificationLevel::Warning), 0);
        assert_eq!(notifier.count_containing("expire in about"), 0);
    }

    #[tokio::test]
    async fn warning_flags_reset_on_a_new_login() {
        let Harness { engine, clock, notifier, transport, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));
        transport.respond_always(200, r#"{"token":"T2"}"#);

        clock.set(DAY_MS - 20 * 60_000);
        tick(&engine).await;
        assert_eq!(notifier.count_containing("expire in about"), 1);

        // New login at the same wall-clock time: the info tier may fire again.
        let base = DAY_MS - 20 * 60_000;
        engine.establish_session(session("T3"), None, Some("R3".into()));
        clock.set(base + DAY_MS - 20 * 60_000);
        tick(&engine).await;
        assert_eq!(notifier.count_containing("expire in about"), 2);
    }

    #[tokio::test]
    async fn renews_when_the_access_token_nears_expiry() {
        let Harness { engine, store, clock, transport, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));
        transport.push_json(200, r#"{"token":"T2"}"#);

        // 4 minutes before access expiry, inside the 5-minute threshold.
        clock.set(HOUR_MS - 4 * 60_000);
        assert_eq!(tick(&engine).await, TickOutcome::Continue);

        assert_eq!(store.read(keys::ACCESS_TOKEN), Some("T2".into()));
        assert_eq!(transport.requests_to("/api/tokens/refresh"), 1);
    }

    #[tokio::test]
    async fn tick_skips_renewal_while_one_is_in_flight() {
        use crate::session::refresh::GatePass;

        let Harness { engine, clock, transport, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));

        // Someone else holds the gate.
        assert!(matches!(engine.gate.begin(), GatePass::Leader));

        clock.set(HOUR_MS - 60_000);
        assert_eq!(tick(&engine).await, TickOutcome::Continue);

        assert_eq!(transport.requests_to("/api/tokens/refresh"), 0);
    }

    #[tokio::test]
    async fn status_is_updated_for_observers() {
        let Harness { engine, clock, .. } = harness();
        clock.set(0);
        engine.establish_session(session("T1"), None, Some("R1".into()));

        clock.set(HOUR_MS / 2);
        tick(&engine).await;

        let status = engine.status_tx.borrow().clone();
        assert_eq!(status.session_time_remaining, DAY_MS - HOUR_MS / 2);
        assert!(status.next_refresh.is_some());
    }
}
