//! Authenticated broker session: subscription, polling and offsets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::{Offset, TopicPartitionList};

use crate::babamul::config::BabamulConfig;
use crate::babamul::error::BabamulError;
use crate::babamul::matcher::{resolve_topics, TopicPattern};

static GROUP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Process-unique group id, so a consumer without an explicit group
/// never inherits committed progress from an earlier run.
fn generate_group_id() -> String {
    let seq = GROUP_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("babamul-{}-{}-{}", std::process::id(), seq, nanos)
}

/// One raw, undecoded message as delivered by the broker.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
    /// Broker timestamp in milliseconds, when available
    pub timestamp: Option<i64>,
}

/// An authenticated, resumable subscription to a set of topics.
///
/// The session is not safe for concurrent driving: `next()` and
/// `close()` take `&mut self`, so one session belongs to one consuming
/// task at a time. Multiple independent sessions may run concurrently.
///
/// Delivery is at-least-once: the committed offset for a message only
/// advances after that message has been handed to the caller, so a
/// crash in between may redeliver it to the group.
pub struct BrokerSession {
    config: BabamulConfig,
    patterns: Vec<TopicPattern>,
    group_id: String,
    consumer: Option<StreamConsumer>,
    subscription: Vec<String>,
    /// (topic, partition, offset) of the last delivered message,
    /// committed on the next poll or at close
    pending: Option<(String, i32, i64)>,
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("config", &self.config)
            .field("patterns", &self.patterns)
            .field("group_id", &self.group_id)
            .field("consumer", &self.consumer.is_some())
            .field("subscription", &self.subscription)
            .field("pending", &self.pending)
            .finish()
    }
}

impl BrokerSession {
    /// Build a session. Performs no I/O; credentials are only checked
    /// at [`open`](Self::open).
    pub fn new(patterns: Vec<TopicPattern>, config: BabamulConfig) -> Self {
        let group_id = config
            .group_id
            .clone()
            .unwrap_or_else(generate_group_id);
        Self {
            config,
            patterns,
            group_id,
            consumer: None,
            subscription: Vec::new(),
            pending: None,
        }
    }

    /// The consumer group this session commits under.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Concrete topics subscribed to; empty before `open()`.
    pub fn subscription(&self) -> &[String] {
        &self.subscription
    }

    pub fn is_open(&self) -> bool {
        self.consumer.is_some()
    }

    /// Establish the authenticated connection, resolve the requested
    /// patterns against broker metadata, and subscribe.
    ///
    /// Patterns are resolved once, here: topics created on the broker
    /// afterward are only picked up by a new `open()`.
    pub async fn open(&mut self) -> Result<(), BabamulError> {
        if self.consumer.is_some() {
            return Err(BabamulError::Configuration(
                "session is already open".to_string(),
            ));
        }
        let username = self.config.username.clone().ok_or_else(|| {
            BabamulError::Authentication(
                "username is required; provide it directly or set BABAMUL_KAFKA_USERNAME"
                    .to_string(),
            )
        })?;
        let password = self.config.password.clone().ok_or_else(|| {
            BabamulError::Authentication(
                "password is required; provide it directly or set BABAMUL_KAFKA_PASSWORD"
                    .to_string(),
            )
        })?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.config.servers)
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", self.config.offset_reset.as_str())
            .set("enable.auto.commit", "false")
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanism", "SCRAM-SHA-512")
            .set("sasl.username", &username)
            .set("sasl.password", &password);
        for (key, value) in &self.config.custom_config {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config.create()?;

        let metadata = consumer.fetch_metadata(None, self.config.request_timeout)?;
        let known: Vec<String> = metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        let resolved = resolve_topics(&self.patterns, known.iter().map(String::as_str))?;
        let topic_refs: Vec<&str> = resolved.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        log::info!(
            "subscribed to {} topic(s) as group {}: {}",
            resolved.len(),
            self.group_id,
            resolved.join(", ")
        );
        self.subscription = resolved;
        self.consumer = Some(consumer);
        Ok(())
    }

    /// Wait for the next message.
    ///
    /// Returns `Ok(Some(..))` when a message arrives and `Ok(None)`
    /// when the configured idle timeout elapses first. A timeout is not
    /// an error and not the end of the stream: topics are long-lived
    /// and producers intermittent, so only the caller can decide that a
    /// quiet stream is finished. The session stays usable for further
    /// polls either way.
    pub async fn next(&mut self) -> Result<Option<RawMessage>, BabamulError> {
        self.commit_pending()?;
        let consumer = self.consumer.as_ref().ok_or_else(|| {
            BabamulError::Configuration("session is not open".to_string())
        })?;

        let raw = {
            let mut stream = consumer.stream();
            let event = match self.config.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, stream.next()).await {
                    Ok(event) => event,
                    Err(_) => {
                        log::debug!(
                            "no message within {:?} on group {}",
                            timeout,
                            self.group_id
                        );
                        return Ok(None);
                    }
                },
                None => stream.next().await,
            };
            match event {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => {
                    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
                    let timestamp = match message.timestamp() {
                        rdkafka::Timestamp::NotAvailable => None,
                        rdkafka::Timestamp::CreateTime(t)
                        | rdkafka::Timestamp::LogAppendTime(t) => Some(t),
                    };
                    RawMessage {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        payload,
                        timestamp,
                    }
                }
            }
        };

        log::debug!(
            "message received: topic={} partition={} offset={} payload_size={}",
            raw.topic,
            raw.partition,
            raw.offset,
            raw.payload.len()
        );
        self.pending = Some((raw.topic.clone(), raw.partition, raw.offset));
        Ok(Some(raw))
    }

    /// Commit the offset of the previously delivered message, if any.
    fn commit_pending(&mut self) -> Result<(), BabamulError> {
        let Some((topic, partition, offset)) = self.pending.take() else {
            return Ok(());
        };
        let Some(consumer) = self.consumer.as_ref() else {
            return Ok(());
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&topic, partition, Offset::Offset(offset + 1))?;
        consumer.commit(&tpl, CommitMode::Sync)?;
        Ok(())
    }

    /// Release the connection and stop polling. Idempotent, and safe to
    /// call whether or not `open()` ever succeeded. Also runs on drop,
    /// so the connection is released on every exit path.
    pub fn close(&mut self) {
        let Some(consumer) = self.consumer.take() else {
            self.pending = None;
            return;
        };
        if let Some((topic, partition, offset)) = self.pending.take() {
            let mut tpl = TopicPartitionList::new();
            let committed = tpl
                .add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                .and_then(|_| consumer.commit(&tpl, CommitMode::Sync));
            if let Err(e) = committed {
                log::warn!(
                    "failed to commit offset {} for {}[{}] at close: {}",
                    offset,
                    topic,
                    partition,
                    e
                );
            }
        }
        consumer.unsubscribe();
        log::info!("closed session for group {}", self.group_id);
    }
}

impl Drop for BrokerSession {
    fn drop(&mut self) {
        self.close();
    }
}
