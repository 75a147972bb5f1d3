//! Message-bus consumer abstraction. The external Kafka client library sits
//! behind the `BusConsumer` trait; `KafkaConfig` carries its connection
//! settings, `MemoryBus` backs tests, and `StubBus` keeps unwired
//! deployments alive without delivering anything.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One delivered message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
}

/// Connection settings for the external bus client, shaped by the
/// deployment environment.
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub url: String,
    pub group_id: String,
    pub client_cert: Option<String>,
    pub client_cert_key: Option<String>,
    pub autopilot_topic: String,
    pub rating_service_topic: String,
}

/// Consumer side of the bus. Delivery is at-least-once; offsets commit per
/// record, after the record has been handled.
#[async_trait]
pub trait BusConsumer: Send {
    /// Block until at least one record is available (or the consumer decides
    /// to come up empty, e.g. after an idle interval).
    async fn poll(&mut self) -> Result<Vec<BusRecord>>;
    async fn commit(&mut self, record: &BusRecord) -> Result<()>;
}

#[async_trait]
impl BusConsumer for Box<dyn BusConsumer + Send> {
    async fn poll(&mut self) -> Result<Vec<BusRecord>> {
        (**self).poll().await
    }

    async fn commit(&mut self, record: &BusRecord) -> Result<()> {
        (**self).commit(record).await
    }
}

/// Which consumer implementation the node wires at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMode {
    Stub,
    Memory,
}

impl BusMode {
    pub fn from_env(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "memory" => BusMode::Memory,
            _ => BusMode::Stub,
        }
    }
}

/// Placeholder consumer for deployments where the external bus client is
/// not wired; polls come up empty after an idle interval.
pub struct StubBus {
    poll_interval: Duration,
}

impl StubBus {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(5))
    }

    pub fn with_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for StubBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusConsumer for StubBus {
    async fn poll(&mut self) -> Result<Vec<BusRecord>> {
        tokio::time::sleep(self.poll_interval).await;
        Ok(Vec::new())
    }

    async fn commit(&mut self, _record: &BusRecord) -> Result<()> {
        Ok(())
    }
}

/// Channel-backed bus for tests and local runs. The handle publishes and
/// observes committed offsets; the consumer half feeds the harness.
pub struct MemoryBus {
    receiver: mpsc::UnboundedReceiver<BusRecord>,
    committed: Arc<Mutex<Vec<(String, i64)>>>,
}

#[derive(Clone)]
pub struct MemoryBusHandle {
    sender: mpsc::UnboundedSender<BusRecord>,
    offsets: Arc<Mutex<HashMap<String, i64>>>,
    committed: Arc<Mutex<Vec<(String, i64)>>>,
}

impl MemoryBus {
    pub fn channel() -> (MemoryBusHandle, MemoryBus) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let committed = Arc::new(Mutex::new(Vec::new()));
        let handle = MemoryBusHandle {
            sender,
            offsets: Arc::new(Mutex::new(HashMap::new())),
            committed: committed.clone(),
        };
        (handle, MemoryBus { receiver, committed })
    }
}

impl MemoryBusHandle {
    /// Append a payload to a topic, assigning the next offset.
    pub fn publish(&self, topic: &str, payload: impl Into<String>) {
        let offset = {
            let mut offsets = self.offsets.lock();
            let slot = offsets.entry(topic.to_string()).or_insert(0);
            let assigned = *slot;
            *slot += 1;
            assigned
        };
        let _ = self.sender.send(BusRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            payload: payload.into(),
        });
    }

    /// `(topic, offset)` pairs committed by the consumer, in commit order.
    pub fn committed(&self) -> Vec<(String, i64)> {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl BusConsumer for MemoryBus {
    async fn poll(&mut self) -> Result<Vec<BusRecord>> {
        match self.receiver.recv().await {
            Some(first) => {
                let mut records = vec![first];
                while let Ok(next) = self.receiver.try_recv() {
                    records.push(next);
                }
                Ok(records)
            }
            None => {
                // All handles dropped; behave like an idle poll.
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn commit(&mut self, record: &BusRecord) -> Result<()> {
        self.committed
            .lock()
            .push((record.topic.clone(), record.offset));
        Ok(())
    }
}
