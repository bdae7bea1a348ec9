//! Progress channel port interface
//!
//! A push channel delivers [`ChannelEvent`]s to every attached
//! [`Subscription`]. Subscriptions are handed out by [`ListenerSet`],
//! which adapters embed to fan events out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::job::{ChannelEvent, JobInput};

/// Channel transport errors
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Failed to send frame: {0}")]
    Send(String),

    #[error("Channel has been disposed")]
    Disposed,
}

/// Port for the long-lived push connection
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Open the connection if it is not open yet
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Ask the service to start a job; the outcome arrives as events
    async fn start_job(&self, input: &JobInput) -> Result<(), ChannelError>;

    /// Attach a listener. Events flow until the subscription is cancelled or dropped.
    fn listen(&self) -> Subscription;

    /// Close the connection and stop reconnecting
    async fn dispose(&self);
}

type Detach = Box<dyn FnOnce() + Send>;

/// Live listener attached to a channel
pub struct Subscription {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    detach: Option<Detach>,
}

impl Subscription {
    /// Wrap a receiver together with the hook that detaches it from its source
    pub fn new(
        events: mpsc::UnboundedReceiver<ChannelEvent>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            detach: Some(Box::new(detach)),
        }
    }

    /// Next event, `None` once cancelled or the source is gone
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        if self.detach.is_none() {
            return None;
        }
        self.events.recv().await
    }

    /// Detach from the source. Buffered events are discarded.
    pub fn cancel(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
        self.events.close();
    }

    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<ChannelEvent>>,
}

/// Registry of attached listeners
#[derive(Clone, Default)]
pub struct ListenerSet {
    inner: Arc<Mutex<Listeners>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new listener
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut listeners = self.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.senders.insert(id, tx);
            id
        };

        let registry: Weak<Mutex<Listeners>> = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || {
            if let Some(inner) = registry.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .senders
                    .remove(&id);
            }
        })
    }

    /// Deliver an event to every listener, pruning closed ones
    pub fn emit(&self, event: &ChannelEvent) {
        self.lock()
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of attached listeners
    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        // Lock is held only for map updates
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(percent: u8) -> ChannelEvent {
        ChannelEvent::Progress {
            step: "step".to_string(),
            percent,
        }
    }

    #[tokio::test]
    async fn emit_reaches_every_listener() {
        let set = ListenerSet::new();
        let mut a = set.subscribe();
        let mut b = set.subscribe();
        assert_eq!(set.len(), 2);

        set.emit(&progress(20));
        assert_eq!(a.recv().await, Some(progress(20)));
        assert_eq!(b.recv().await, Some(progress(20)));
    }

    #[tokio::test]
    async fn cancel_detaches_listener() {
        let set = ListenerSet::new();
        let mut sub = set.subscribe();
        sub.cancel();

        assert!(set.is_empty());
        assert!(!sub.is_active());
        set.emit(&progress(40));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_discards_buffered_events() {
        let set = ListenerSet::new();
        let mut sub = set.subscribe();
        set.emit(&progress(40));
        sub.cancel();
        assert_eq!(sub.recv().await, None);
    }

    #[test]
    fn drop_detaches_listener() {
        let set = ListenerSet::new();
        {
            let _sub = set.subscribe();
            assert_eq!(set.len(), 1);
        }
        assert!(set.is_empty());
    }

    #[test]
    fn cancel_twice_is_harmless() {
        let set = ListenerSet::new();
        let mut sub = set.subscribe();
        sub.cancel();
        sub.cancel();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn subscription_outlives_registry() {
        let set = ListenerSet::new();
        let mut sub = set.subscribe();
        drop(set);
        assert_eq!(sub.recv().await, None);
        sub.cancel();
    }
}
