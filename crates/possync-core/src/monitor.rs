//! Connectivity & session monitor
//!
//! Tracks two independent signals: network reachability, fed by the host's
//! online/offline events (never polled), and presence of a local session
//! token. Sync attempts are gated on both.
//!
//! The monitor never starts a sync itself. Interested parties subscribe to
//! state changes; the orchestrator's reconnect hook turns `CameOnline` and
//! `SignedIn` transitions into a one-shot sync.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::info;

use crate::gateway::BearerToken;

/// Snapshot of both signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub online: bool,
    pub authenticated: bool,
}

impl ConnectivityState {
    pub fn can_sync(&self) -> bool {
        self.online && self.authenticated
    }
}

/// What changed on an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
    SignedIn,
    SignedOut,
    Unchanged,
}

impl Transition {
    /// Whether this transition warrants a one-shot sync attempt
    pub fn triggers_sync(&self) -> bool {
        matches!(self, Transition::CameOnline | Transition::SignedIn)
    }

    /// Classify the change between two states
    pub fn between(before: ConnectivityState, after: ConnectivityState) -> Self {
        match (before.online, after.online) {
            (false, true) => return Transition::CameOnline,
            (true, false) => return Transition::WentOffline,
            _ => {}
        }
        match (before.authenticated, after.authenticated) {
            (false, true) => Transition::SignedIn,
            (true, false) => Transition::SignedOut,
            _ => Transition::Unchanged,
        }
    }
}

/// Event-driven connectivity and session tracker
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
    state_rx: watch::Receiver<ConnectivityState>,
    session: BearerToken,
    pending: AtomicU64,
    sync_expected: AtomicBool,
}

impl ConnectivityMonitor {
    /// `session` is the local session token slot shared with the local gateway
    pub fn new(session: BearerToken, online: bool) -> Self {
        let initial = ConnectivityState {
            online,
            authenticated: session.is_present(),
        };
        let (state, state_rx) = watch::channel(initial);

        Self {
            state,
            state_rx,
            session,
            pending: AtomicU64::new(0),
            sync_expected: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState {
            online: self.is_online(),
            authenticated: self.is_authenticated(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state_rx.borrow().online
    }

    /// Whether a local session token is present
    pub fn is_authenticated(&self) -> bool {
        self.session.is_present()
    }

    pub fn can_sync(&self) -> bool {
        self.state().can_sync()
    }

    pub fn session(&self) -> &BearerToken {
        &self.session
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_rx.clone()
    }

    /// Feed a network online/offline event
    pub fn set_online(&self, online: bool) -> Transition {
        let transition = self.update(|state| state.online = online);
        if transition == Transition::WentOffline {
            self.sync_expected.store(false, Ordering::SeqCst);
        }
        if transition != Transition::Unchanged {
            info!("Network is {}", if online { "online" } else { "offline" });
        }
        transition
    }

    /// Set or clear the local session token
    pub fn set_local_session(&self, token: Option<String>) -> Transition {
        self.session.set(token);
        let authenticated = self.session.is_present();
        let transition = self.update(|state| state.authenticated = authenticated);
        if transition != Transition::Unchanged {
            info!(
                "Local session {}",
                if authenticated { "started" } else { "ended" }
            );
        }
        transition
    }

    fn update(&self, change: impl FnOnce(&mut ConnectivityState)) -> Transition {
        let before = *self.state_rx.borrow();
        let mut after = before;
        after.authenticated = self.session.is_present();
        change(&mut after);

        let transition = Transition::between(before, after);
        if after != before {
            self.state.send_replace(after);
        }
        transition
    }

    /// Number of local operations awaiting upload, as last reported
    pub fn pending_count(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn set_pending_count(&self, count: u64) {
        self.pending.store(count, Ordering::SeqCst);
    }

    /// Mark that the UI is optimistically expecting a sync to happen
    pub fn expect_sync(&self) {
        self.sync_expected.store(true, Ordering::SeqCst);
    }

    /// Clear the optimistic expectation (sync finished or went offline)
    pub fn clear_sync_expectation(&self) {
        self.sync_expected.store(false, Ordering::SeqCst);
    }

    pub fn sync_expected(&self) -> bool {
        self.sync_expected.load(Ordering::SeqCst)
    }
}
