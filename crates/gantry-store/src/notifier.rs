//! A notifier adapter that records everything it is asked to dispatch.

use async_trait::async_trait;
use gantry_core::events::Notification;
use gantry_core::ports::Notifier;
use gantry_core::Result;
use std::sync::Mutex;

/// Records notifications instead of dispatching them. Used by embedded
/// setups that drain the queue themselves and by tests asserting on side
/// effects.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&Notification) -> bool) -> usize {
        self.sent().iter().filter(|n| predicate(n)).count()
    }

    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock().expect("notifier lock poisoned"))
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(notification);
        Ok(())
    }
}
