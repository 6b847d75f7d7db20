use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Manual-reset boolean signal.
///
/// Engine code only ever sets or tests an event; waiting is reserved for the deferred worker.
#[derive(Debug, Default)]
pub struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = false;
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while !*state {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Returns whether the event was set before `timeout` elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |set| !*set)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state
    }
}
