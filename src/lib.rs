//! # babamul
//!
//! A Rust client for consuming ZTF/LSST transient alerts from the
//! BABAMUL Kafka streams, with wildcard topic subscription, typed Avro
//! decoding, and light-curve normalization.
//!
//! ## Features
//!
//! - **Wildcard subscriptions**: `babamul.ztf.*.hosted` expands against
//!   live broker metadata at subscribe time
//! - **Typed alerts**: raw Avro payloads become validated [`Alert`]
//!   records; detections and non-detections are explicit variants, not
//!   optional-field conventions
//! - **Light curves**: one call merges an alert's current detection
//!   with its embedded history into a time-ordered, deduplicated view
//! - **Deterministic lifecycle**: sessions release their connection on
//!   every exit path, and a poll timeout is a pause, never an error
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use babamul::{AlertConsumer, BabamulConfig, OffsetReset};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BabamulConfig::from_env()
//!         .offset_reset(OffsetReset::Earliest)
//!         .timeout(Duration::from_secs(30));
//!
//!     let mut consumer = AlertConsumer::new(
//!         ["babamul.ztf.lsst-match.hosted", "babamul.lsst.ztf-match.hosted"],
//!         config,
//!     )?;
//!     consumer.open().await?;
//!
//!     while let Some(alert) = consumer.next().await? {
//!         println!("{} ({})", alert.object_id, alert.survey);
//!         for point in &alert.light_curve() {
//!             match point.mag() {
//!                 Some(mag) => println!("  {:.5}: {:.2}", point.jd(), mag),
//!                 None => println!("  {:.5}: not detected", point.jd()),
//!             }
//!         }
//!     }
//!
//!     consumer.close();
//!     Ok(())
//! }
//! ```

pub mod babamul;

// Re-export the main API at crate root for easy access
pub use babamul::alert::{
    flux_err_to_limit, flux_to_mag, jd_to_datetime, Alert, AlertProperties, Band, Candidate,
    PhotometryPoint, Survey, LSST_ZP, ZTF_ZP,
};
pub use babamul::config::{
    BabamulConfig, OffsetReset, BACKUP_KAFKA_SERVER, MAIN_KAFKA_SERVER,
};
pub use babamul::consumer::AlertConsumer;
pub use babamul::decoder::{AlertDecoder, DecodeError};
pub use babamul::error::BabamulError;
pub use babamul::lightcurve::LightCurve;
pub use babamul::matcher::{resolve_topics, TopicPattern};
pub use babamul::session::{BrokerSession, RawMessage};
