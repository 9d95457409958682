//! High-level alert consumer: pattern resolution, session management
//! and decoding behind one iteration interface.

use futures::Stream;

use crate::babamul::alert::{Alert, Survey};
use crate::babamul::config::BabamulConfig;
use crate::babamul::decoder::{AlertDecoder, DecodeError};
use crate::babamul::error::BabamulError;
use crate::babamul::matcher::TopicPattern;
use crate::babamul::session::{BrokerSession, RawMessage};

/// A typed consumer for BABAMUL alert streams
///
/// Composes pattern resolution, the authenticated broker session and
/// Avro decoding into a lazy sequence of [`Alert`]s. The stream is
/// infinite by design; it pauses (`Ok(None)`) when the idle timeout
/// elapses and only ends when the caller closes the session.
///
/// # Examples
///
/// ```rust,no_run
/// use babamul::{AlertConsumer, BabamulConfig, OffsetReset};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = BabamulConfig::from_env()
///         .offset_reset(OffsetReset::Earliest)
///         .timeout(Duration::from_secs(30));
///     let mut consumer = AlertConsumer::new(["babamul.ztf.*.hosted"], config)?;
///     consumer.open().await?;
///
///     while let Some(alert) = consumer.next().await? {
///         let candidate = &alert.candidate;
///         println!(
///             "{} at ({:.6}, {:.6}): {:.2} +/- {:.2}",
///             alert.object_id, candidate.ra, candidate.dec,
///             candidate.magpsf, candidate.sigmapsf,
///         );
///         println!("  photometry points: {}", alert.light_curve().len());
///     }
///
///     consumer.close();
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct AlertConsumer {
    session: BrokerSession,
}

impl AlertConsumer {
    /// Build a consumer for the given topic patterns. Validates the
    /// patterns eagerly but performs no I/O; connecting happens in
    /// [`open`](Self::open).
    pub fn new<I, S>(patterns: I, config: BabamulConfig) -> Result<Self, BabamulError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| TopicPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if patterns.is_empty() {
            return Err(BabamulError::Configuration(
                "at least one topic pattern is required".to_string(),
            ));
        }
        Ok(Self {
            session: BrokerSession::new(patterns, config),
        })
    }

    /// Build a consumer configured from the environment.
    pub fn from_env<I, S>(patterns: I) -> Result<Self, BabamulError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(patterns, BabamulConfig::from_env())
    }

    /// Connect, authenticate and subscribe.
    pub async fn open(&mut self) -> Result<(), BabamulError> {
        self.session.open().await
    }

    /// The consumer group this consumer commits under.
    pub fn group_id(&self) -> &str {
        self.session.group_id()
    }

    /// Concrete topics subscribed to; empty before `open()`.
    pub fn subscription(&self) -> &[String] {
        self.session.subscription()
    }

    /// Wait for the next alert.
    ///
    /// `Ok(None)` means the idle timeout elapsed with nothing to read —
    /// the subscription is still live. Messages that fail to decode are
    /// logged and skipped: one malformed record must not take down a
    /// long-lived consumer.
    pub async fn next(&mut self) -> Result<Option<Alert>, BabamulError> {
        loop {
            let Some(raw) = self.session.next().await? else {
                return Ok(None);
            };
            match self.decode(&raw) {
                Ok(alert) => return Ok(Some(alert)),
                Err(e) => {
                    log::warn!(
                        "skipping undecodable message: topic={} partition={} offset={}: {}",
                        raw.topic,
                        raw.partition,
                        raw.offset,
                        e
                    );
                }
            }
        }
    }

    /// Decode one raw message into an alert, stamping the source topic.
    pub fn decode(&self, raw: &RawMessage) -> Result<Alert, BabamulError> {
        let survey = Survey::from_topic(&raw.topic)
            .ok_or_else(|| DecodeError::UnknownSurvey(raw.topic.clone()))?;
        let mut alert = AlertDecoder::new(survey).decode(&raw.payload)?;
        alert.topic = Some(raw.topic.clone());
        Ok(alert)
    }

    /// The alerts as a lazy [`Stream`], ending on the first idle
    /// timeout. Errors terminate the stream; a fresh session is needed
    /// afterwards.
    pub fn stream(&mut self) -> impl Stream<Item = Result<Alert, BabamulError>> + '_ {
        futures::stream::try_unfold(self, |consumer| async move {
            match consumer.next().await? {
                Some(alert) => Ok(Some((alert, consumer))),
                None => Ok(None),
            }
        })
    }

    /// Release the connection. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        self.session.close();
    }
}
