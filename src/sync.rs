use crate::model::{ActionToken, Emotion, Metrics};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fmt};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum WindowId {
    Main,
    Pip,
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowId::Main => f.write_str("main"),
            WindowId::Pip => f.write_str("pip"),
        }
    }
}

/// State pushed from one window to its peers. Any subset of fields may be
/// present and receivers apply only what is there.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct SyncMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) action: Option<ActionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) emotion: Option<Emotion>,
}

impl SyncMessage {
    pub(crate) fn action(token: ActionToken, metrics: Metrics) -> Self {
        Self {
            action: Some(token),
            metrics: Some(metrics),
            emotion: None,
        }
    }

    pub(crate) fn metrics(metrics: Metrics) -> Self {
        Self {
            action: None,
            metrics: Some(metrics),
            emotion: Some(metrics.emotion),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.action.is_none() && self.metrics.is_none() && self.emotion.is_none()
    }
}

/// Relays messages between windows. Last writer wins; there is no
/// ordering across senders beyond channel order per receiver.
#[derive(Default)]
pub(crate) struct SyncHub {
    peers: RefCell<Vec<(WindowId, mpsc::UnboundedSender<SyncMessage>)>>,
}

impl SyncHub {
    pub(crate) fn register(&self, id: WindowId) -> mpsc::UnboundedReceiver<SyncMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut peers = self.peers.borrow_mut();
        peers.retain(|(peer, _)| *peer != id);
        peers.push((id, tx));
        rx
    }

    /// Sends to every registered window except `from`. Returns how many
    /// windows received it.
    pub(crate) fn publish(&self, from: WindowId, msg: SyncMessage) -> usize {
        if msg.is_empty() {
            return 0;
        }
        let mut delivered = 0;
        self.peers.borrow_mut().retain(|(peer, tx)| {
            if *peer == from {
                return true;
            }
            match tx.send(msg.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        debug!(%from, delivered, "state broadcast");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_skips_the_sender() {
        let hub = SyncHub::default();
        let mut main = hub.register(WindowId::Main);
        let mut pip = hub.register(WindowId::Pip);

        let msg = SyncMessage::action(ActionToken::Eating, Metrics::default());
        assert_eq!(hub.publish(WindowId::Main, msg.clone()), 1);

        assert_eq!(pip.try_recv().unwrap(), msg);
        assert!(main.try_recv().is_err());
    }

    #[test]
    fn closed_peers_are_dropped() {
        let hub = SyncHub::default();
        let _main = hub.register(WindowId::Main);
        drop(hub.register(WindowId::Pip));
        assert_eq!(hub.publish(WindowId::Main, SyncMessage::metrics(Metrics::default())), 0);
        assert_eq!(hub.peers.borrow().len(), 1);
    }

    #[test]
    fn empty_messages_are_not_sent() {
        let hub = SyncHub::default();
        let mut pip = hub.register(WindowId::Pip);
        assert_eq!(hub.publish(WindowId::Main, SyncMessage::default()), 0);
        assert!(pip.try_recv().is_err());
    }

    #[test]
    fn absent_fields_stay_off_the_wire() {
        let json = serde_json::to_value(SyncMessage {
            emotion: Some(Emotion::Sad),
            ..SyncMessage::default()
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "emotion": "sad" }));

        let msg: SyncMessage = serde_json::from_str(r#"{"action":"learning"}"#).unwrap();
        assert_eq!(msg.action, Some(ActionToken::Learning));
        assert!(msg.metrics.is_none());
    }
}
