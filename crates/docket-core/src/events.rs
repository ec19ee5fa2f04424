use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    TasksChanged,
    ListsChanged,
}

/// Emitted after every successful mutation so views can refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub owner: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Sends to current subscribers. Having none is not an error.
    pub fn publish(&self, owner: &str, kind: ChangeKind) {
        let receivers = self
            .sender
            .send(ChangeEvent {
                owner: owner.to_string(),
                kind,
            })
            .unwrap_or(0);
        trace!(owner, ?kind, receivers, "published change");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}
