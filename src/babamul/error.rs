use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use crate::babamul::decoder::DecodeError;

/// Unified error type for BABAMUL consumer operations
///
/// Timeouts are not represented here: an idle-timeout elapsing is an
/// expected outcome of a long-lived subscription and is reported as
/// `Ok(None)` by the polling methods instead.
#[derive(Debug)]
pub enum BabamulError {
    /// Credentials missing or rejected by the broker. Terminal for the
    /// session; retrying with the same credentials will not succeed.
    Authentication(String),
    /// Broker unreachable or the transport broke. Terminal per attempt;
    /// the caller may retry with a fresh `open()`.
    Connection(KafkaError),
    /// The requested topic patterns matched nothing on the broker.
    NoMatchingTopics { patterns: Vec<String> },
    /// A message payload could not be decoded into an alert.
    Decode(DecodeError),
    /// Invalid configuration (bad pattern syntax, session misuse).
    Configuration(String),
}

impl std::fmt::Display for BabamulError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BabamulError::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            BabamulError::Connection(e) => write!(f, "Connection to Kafka failed: {}", e),
            BabamulError::NoMatchingTopics { patterns } => write!(
                f,
                "No topics on the broker match the requested patterns: {}",
                patterns.join(", ")
            ),
            BabamulError::Decode(e) => write!(f, "Alert decoding failed: {}", e),
            BabamulError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for BabamulError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BabamulError::Connection(e) => Some(e),
            BabamulError::Decode(e) => Some(e),
            BabamulError::Authentication(_)
            | BabamulError::NoMatchingTopics { .. }
            | BabamulError::Configuration(_) => None,
        }
    }
}

/// Whether a librdkafka error code indicates a credential problem
/// rather than a transport one.
fn is_auth_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::Authentication
            | RDKafkaErrorCode::SaslAuthenticationFailed
            | RDKafkaErrorCode::TopicAuthorizationFailed
            | RDKafkaErrorCode::ClusterAuthorizationFailed
            | RDKafkaErrorCode::GroupAuthorizationFailed
    )
}

impl From<KafkaError> for BabamulError {
    fn from(err: KafkaError) -> Self {
        match err.rdkafka_error_code() {
            Some(code) if is_auth_code(code) => BabamulError::Authentication(err.to_string()),
            _ => BabamulError::Connection(err),
        }
    }
}

impl From<DecodeError> for BabamulError {
    fn from(err: DecodeError) -> Self {
        BabamulError::Decode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let auth = BabamulError::Authentication("bad password".to_string());
        assert_eq!(auth.to_string(), "Authentication failed: bad password");

        let no_topics = BabamulError::NoMatchingTopics {
            patterns: vec!["babamul.ztf.*".to_string(), "babamul.lsst.*".to_string()],
        };
        assert!(no_topics.to_string().contains("babamul.ztf.*"));
        assert!(no_topics.to_string().contains("babamul.lsst.*"));
    }

    #[test]
    fn test_error_source() {
        let auth = BabamulError::Authentication("nope".to_string());
        assert!(auth.source().is_none());

        let conn =
            BabamulError::Connection(KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown));
        assert!(conn.source().is_some());
    }

    #[test]
    fn test_kafka_error_classification() {
        let sasl = KafkaError::MetadataFetch(RDKafkaErrorCode::SaslAuthenticationFailed);
        assert!(matches!(
            BabamulError::from(sasl),
            BabamulError::Authentication(_)
        ));

        let down = KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown);
        assert!(matches!(
            BabamulError::from(down),
            BabamulError::Connection(_)
        ));

        let transport = KafkaError::MetadataFetch(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(matches!(
            BabamulError::from(transport),
            BabamulError::Connection(_)
        ));
    }
}
