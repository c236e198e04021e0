//! Cancel-and-reschedule timers
//!
//! A [`TimerSlot`] holds at most one outstanding timer. Scheduling again
//! aborts the previous one, so bursts of edits never stack callbacks.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Run `fire` after `delay`, replacing any timer already in this slot
    ///
    /// Without a tokio runtime the timer is skipped.
    pub(crate) fn schedule<F>(&self, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(timer = self.name, "No runtime, timer not scheduled");
            return;
        };
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        if let Some(previous) = self.handle.lock().replace(task) {
            previous.abort();
        }
    }

    /// Abort the outstanding timer. Returns `true` if one was still waiting.
    pub(crate) fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                let waiting = !handle.is_finished();
                handle.abort();
                waiting
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
