//! Shared session owner
//!
//! Every mutation goes through `watch::Sender::send_modify`, which serializes
//! writers and publishes the new state to subscribers in one step. Readers
//! only ever see complete sessions.

use std::sync::Arc;
use tokio::sync::watch;

use crate::session::{Display, Session};

#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Session::new());
        Self { tx: Arc::new(tx) }
    }

    /// Run `f` against the session and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut Session)) {
        self.tx.send_modify(f);
    }

    /// Clone of the current session
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn display(&self) -> Display {
        self.tx.borrow().display()
    }

    pub fn is_refreshing(&self) -> bool {
        self.tx.borrow().is_refreshing()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn scrub(&self, index: usize) {
        self.update(|s| s.scrub(index));
    }

    pub fn go_live(&self) {
        self.update(Session::go_live);
    }
}
