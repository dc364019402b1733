//! Database-notification pub/sub bridge.
//!
//! One `Publisher` per notification channel. The first subscriber starts a
//! long-lived LISTEN connection; the last one leaving tears it down and
//! nils the handle. Payloads are plain identifier strings matched
//! string-equal against each subscriber's filter.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_postgres::{AsyncMessage, NoTls};

/// Outbound queue depth per subscriber before messages are dropped with
/// the subscriber itself.
const SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    filter: String,
    tx: mpsc::Sender<String>,
}

struct ListenerHandle {
    task: tokio::task::JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
    listener: Option<ListenerHandle>,
}

/// Ref-counted pub/sub fan-out for one LISTEN channel.
#[derive(Clone)]
pub struct Publisher {
    database_url: String,
    channel: String,
    inner: Arc<Mutex<Inner>>,
    /// Skip the database connection; lifecycle-only mode for tests.
    offline: bool,
}

/// A live subscription. Close it (or drop it) to unsubscribe; the publisher
/// re-evaluates the listener lifecycle on removal.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<String>,
    publisher: Publisher,
    closed: bool,
}

impl Publisher {
    pub fn new(database_url: &str, channel: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            channel: channel.to_string(),
            inner: Arc::new(Mutex::new(Inner::default())),
            offline: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn offline(channel: &str) -> Self {
        Self {
            offline: true,
            ..Self::new("postgres://unused", channel)
        }
    }

    /// Add a subscriber for payloads equal to `filter`. Starts the listener
    /// on the 0 -> 1 transition.
    pub async fn subscribe(&self, filter: String) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, Subscriber { filter, tx });

        if inner.listener.is_none() {
            inner.listener = Some(self.start_listener());
            tracing::info!(channel = %self.channel, "listener started");
        }

        Subscription {
            id,
            rx,
            publisher: self.clone(),
            closed: false,
        }
    }

    /// Remove a subscriber; stops the listener on the 1 -> 0 transition.
    pub async fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.remove(&id);
        if inner.subscribers.is_empty() {
            if let Some(handle) = inner.listener.take() {
                let _ = handle.shutdown.send(true);
                handle.task.abort();
                tracing::info!(channel = %self.channel, "listener stopped");
            }
        }
    }

    /// Number of live subscribers (used by tests and the status surface).
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    pub async fn has_listener(&self) -> bool {
        self.inner.lock().await.listener.is_some()
    }

    /// Deliver a payload to every subscriber whose filter matches.
    ///
    /// Recipients are snapshotted under the lock, sends happen outside it.
    /// A subscriber whose queue is gone or full is removed; removal
    /// re-evaluates listener shutdown.
    pub async fn fan_out(&self, payload: &str) {
        let recipients: Vec<(u64, mpsc::Sender<String>)> = {
            let inner = self.inner.lock().await;
            inner
                .subscribers
                .iter()
                .filter(|(_, s)| s.filter == payload)
                .map(|(id, s)| (*id, s.tx.clone()))
                .collect()
        };

        for (id, tx) in recipients {
            if tx.try_send(payload.to_string()).is_err() {
                tracing::warn!(subscriber = id, "dropping unreachable subscriber");
                self.unsubscribe(id).await;
            }
        }
    }

    fn start_listener(&self) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let publisher = self.clone();
        let task = tokio::spawn(async move {
            if publisher.offline {
                let mut shutdown = shutdown_rx;
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                return;
            }
            if let Err(e) = run_listener(&publisher, shutdown_rx).await {
                tracing::error!(channel = %publisher.channel, error = %e, "listener failed");
                // Tear down so the next subscriber action restarts it.
                let mut inner = publisher.inner.lock().await;
                inner.listener = None;
            }
        });
        ListenerHandle {
            task,
            shutdown: shutdown_tx,
        }
    }
}

/// The listener body: LISTEN on a dedicated connection, forward matching
/// notifications, poll cancellation between reads.
async fn run_listener(
    publisher: &Publisher,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), tokio_postgres::Error> {
    let (client, mut connection) =
        tokio_postgres::connect(&publisher.database_url, NoTls).await?;

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel::<String>();
    let driver = tokio::spawn(async move {
        let mut messages =
            futures_util::stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(n)) => {
                    if notify_tx.send(n.payload().to_string()).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "notification connection error");
                    break;
                }
            }
        }
    });

    // Channel names come from configuration, not user input; quote anyway.
    client
        .batch_execute(&format!("LISTEN \"{}\"", publisher.channel))
        .await?;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            payload = notify_rx.recv() => {
                match payload {
                    Some(payload) => publisher.fan_out(&payload).await,
                    // Driver ended: connection is gone.
                    None => break,
                }
            }
        }
    }

    driver.abort();
    Ok(())
}

impl Subscription {
    /// Receive the next matching payload; `None` after removal.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Graceful close; unexpected disconnects route through the same
    /// removal path via `Drop`.
    pub async fn close(mut self) {
        self.closed = true;
        self.publisher.unsubscribe(self.id).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.closed {
            let publisher = self.publisher.clone();
            let id = self.id;
            tokio::spawn(async move {
                publisher.unsubscribe(id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> Publisher {
        Publisher::offline("pipeline_run_tasks")
    }

    #[tokio::test]
    async fn test_listener_lifecycle_refcount() {
        let p = publisher();
        assert!(!p.has_listener().await);

        let a = p.subscribe("7".to_string()).await;
        assert!(p.has_listener().await);
        assert_eq!(p.subscriber_count().await, 1);

        let b = p.subscribe("9".to_string()).await;
        assert_eq!(p.subscriber_count().await, 2);

        a.close().await;
        assert!(p.has_listener().await, "listener stays while subscribers remain");

        b.close().await;
        assert!(!p.has_listener().await, "last unsubscribe tears down listener");
        assert_eq!(p.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_fan_out_matches_filter() {
        let p = publisher();
        let mut a = p.subscribe("7".to_string()).await;
        let mut b = p.subscribe("9".to_string()).await;

        p.fan_out("7").await;
        p.fan_out("9").await;
        p.fan_out("7").await;

        assert_eq!(a.recv().await.as_deref(), Some("7"));
        assert_eq!(a.recv().await.as_deref(), Some("7"));
        assert_eq!(b.recv().await.as_deref(), Some("9"));

        a.close().await;
        b.close().await;
    }

    #[tokio::test]
    async fn test_unresponsive_subscriber_removed_on_send() {
        let p = publisher();
        let _stuck = p.subscribe("7".to_string()).await;
        let mut live = p.subscribe("9".to_string()).await;

        // Never drained: once its buffer is full the next send prunes it.
        for _ in 0..=SUBSCRIBER_BUFFER {
            p.fan_out("7").await;
        }
        assert_eq!(p.subscriber_count().await, 1);

        // The healthy subscriber is unaffected.
        p.fan_out("9").await;
        assert_eq!(live.recv().await.as_deref(), Some("9"));

        live.close().await;
        // _stuck was already removed by the failed send, so the listener is
        // torn down when the last live subscriber leaves.
        assert!(!p.has_listener().await);
    }
}
