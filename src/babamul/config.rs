use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default BABAMUL Kafka broker (Caltech).
pub const MAIN_KAFKA_SERVER: &str = "kaboom.caltech.edu:9093";
/// Backup BABAMUL Kafka broker (University of Minnesota).
pub const BACKUP_KAFKA_SERVER: &str = "babamul.umn.edu:9093";

const ENV_USERNAME: &str = "BABAMUL_KAFKA_USERNAME";
const ENV_PASSWORD: &str = "BABAMUL_KAFKA_PASSWORD";
const ENV_SERVER: &str = "BABAMUL_SERVER";

/// Where a fresh consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    /// Start from the oldest retained message.
    Earliest,
    /// Only new messages published after the subscription.
    Latest,
}

impl OffsetReset {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

/// Configuration for connecting to the BABAMUL Kafka streams
///
/// Construction never performs I/O and never fails: missing credentials
/// are only reported, as an authentication error, when a session is
/// opened.
#[derive(Debug, Clone)]
pub struct BabamulConfig {
    /// Broker address, `host:port`
    pub servers: String,
    /// SASL username
    pub username: Option<String>,
    /// SASL password
    pub password: Option<String>,
    /// Consumer group ID. `None` means each session generates a fresh,
    /// process-unique group so restarts do not inherit prior progress.
    pub group_id: Option<String>,
    /// Where a fresh group starts reading
    pub offset_reset: OffsetReset,
    /// Idle timeout for a single poll. `None` blocks indefinitely.
    pub timeout: Option<Duration>,
    /// Timeout for metadata and other broker requests
    pub request_timeout: Duration,
    /// Extra librdkafka properties, applied last so they can override
    /// the defaults (e.g. `security.protocol`)
    pub custom_config: HashMap<String, String>,
}

impl Default for BabamulConfig {
    fn default() -> Self {
        Self {
            servers: MAIN_KAFKA_SERVER.to_string(),
            username: None,
            password: None,
            group_id: None,
            offset_reset: OffsetReset::Latest,
            timeout: None,
            request_timeout: Duration::from_secs(30),
            custom_config: HashMap::new(),
        }
    }
}

impl BabamulConfig {
    /// Create a config with explicit credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// Create a config from the environment.
    ///
    /// Reads `BABAMUL_KAFKA_USERNAME`, `BABAMUL_KAFKA_PASSWORD` and
    /// `BABAMUL_SERVER` (falling back to the main broker). Absent
    /// variables are left unset here; they surface as an authentication
    /// error when the session is opened.
    pub fn from_env() -> Self {
        Self {
            servers: env::var(ENV_SERVER).unwrap_or_else(|_| MAIN_KAFKA_SERVER.to_string()),
            username: env::var(ENV_USERNAME).ok(),
            password: env::var(ENV_PASSWORD).ok(),
            ..Default::default()
        }
    }

    /// Set the broker address
    pub fn server(mut self, servers: impl Into<String>) -> Self {
        self.servers = servers.into();
        self
    }

    /// Set the SASL username
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the SASL password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set an explicit consumer group ID to resume committed progress
    /// across restarts
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set where a fresh group starts reading
    pub fn offset_reset(mut self, reset: OffsetReset) -> Self {
        self.offset_reset = reset;
        self
    }

    /// Set the idle timeout for a single poll
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Block indefinitely on each poll
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the broker request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Add a custom librdkafka property
    pub fn custom_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_config.insert(key.into(), value.into());
        self
    }

    /// Whether both credentials are present
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BabamulConfig::default();
        assert_eq!(config.servers, MAIN_KAFKA_SERVER);
        assert_eq!(config.offset_reset, OffsetReset::Latest);
        assert!(config.timeout.is_none());
        assert!(config.group_id.is_none());
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_builder_pattern() {
        let config = BabamulConfig::new("alice", "hunter2")
            .server(BACKUP_KAFKA_SERVER)
            .group_id("my-group")
            .offset_reset(OffsetReset::Earliest)
            .timeout(Duration::from_secs(30))
            .custom_property("security.protocol", "SASL_PLAINTEXT");

        assert_eq!(config.servers, BACKUP_KAFKA_SERVER);
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.group_id.as_deref(), Some("my-group"));
        assert_eq!(config.offset_reset.as_str(), "earliest");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            config.custom_config.get("security.protocol").map(String::as_str),
            Some("SASL_PLAINTEXT")
        );
        assert!(config.has_credentials());
    }

    #[test]
    fn test_partial_credentials() {
        let config = BabamulConfig::default().username("alice");
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_offset_reset_strings() {
        assert_eq!(OffsetReset::Earliest.as_str(), "earliest");
        assert_eq!(OffsetReset::Latest.as_str(), "latest");
    }
}
