use std::sync::Mutex;

use tokio::sync::broadcast;

/// Outcome of a coordinated token refresh, broadcast to every waiter.
#[derive(Debug, Clone)]
pub(crate) enum RefreshOutcome {
    /// A new access token was obtained.
    Refreshed(String),
    /// The refresh failed terminally; the session is gone.
    Failed,
}

/// Single-flight coordination for token refreshes.
///
/// The first caller to [`begin`](RefreshGate::begin) becomes the leader and
/// must call [`finish`](RefreshGate::finish) exactly once; everyone else
/// becomes a follower and awaits the leader's outcome on the returned
/// channel. State is per-instance and in-memory only.
#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

pub(crate) enum GatePass {
    Leader,
    Follower(broadcast::Receiver<RefreshOutcome>),
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self) -> GatePass {
        let mut slot = self.in_flight.lock().expect("refresh gate lock");
        match slot.as_ref() {
            Some(sender) => GatePass::Follower(sender.subscribe()),
            None => {
                let (sender, _) = broadcast::channel(8);
                *slot = Some(sender);
                GatePass::Leader
            }
        }
    }

    pub(crate) fn finish(&self, outcome: RefreshOutcome) {
        let sender = self.in_flight.lock().expect("refresh gate lock").take();
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        self.in_flight.lock().expect("refresh gate lock").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_caller_leads_then_resets() {
        let gate = RefreshGate::new();
        assert!(!gate.is_refreshing());

        assert!(matches!(gate.begin(), GatePass::Leader));
        assert!(gate.is_refreshing());

        gate.finish(RefreshOutcome::Failed);
        assert!(!gate.is_refreshing());

        // the next cycle gets a fresh leader
        assert!(matches!(gate.begin(), GatePass::Leader));
    }

    #[tokio::test]
    async fn followers_receive_the_leaders_outcome() {
        let gate = RefreshGate::new();
        assert!(matches!(gate.begin(), GatePass::Leader));

        let GatePass::Follower(mut first) = gate.begin() else {
            panic!("expected follower");
        };
        let GatePass::Follower(mut second) = gate.begin() else {
            panic!("expected follower");
        };

        gate.finish(RefreshOutcome::Refreshed("T2".into()));

        assert!(matches!(first.recv().await, Ok(RefreshOutcome::Refreshed(t)) if t == "T2"));
        assert!(matches!(second.recv().await, Ok(RefreshOutcome::Refreshed(t)) if t == "T2"));
    }
}
