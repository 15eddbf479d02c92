use std::sync::Arc;
use tokio::sync::watch;

/// Edge-triggered wake-up for idle upload workers.
///
/// Backed by a generation counter in a watch channel: a notification sent
/// while a worker is busy is still seen the next time it waits.
#[derive(Clone)]
pub struct WakeSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
