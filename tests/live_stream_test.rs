//! Scenarios that need a live broker. Run them explicitly with
//! `cargo test -- --ignored` after exporting BABAMUL_KAFKA_USERNAME,
//! BABAMUL_KAFKA_PASSWORD and (optionally) BABAMUL_SERVER.

use std::time::{Duration, Instant};

use babamul::{AlertConsumer, BabamulConfig, BabamulError};

#[tokio::test]
#[ignore = "requires a live broker"]
async fn test_invalid_password_is_an_authentication_error() {
    let config = BabamulConfig::from_env()
        .password("definitely-not-the-password")
        .request_timeout(Duration::from_secs(10));
    let mut consumer = AlertConsumer::new(["babamul.ztf.*.hosted"], config).unwrap();

    let err = consumer.open().await.unwrap_err();
    assert!(matches!(err, BabamulError::Authentication(_)), "{:?}", err);
    // nothing was subscribed, and close is still safe
    assert!(consumer.subscription().is_empty());
    consumer.close();
}

#[tokio::test]
#[ignore = "requires a live broker"]
async fn test_idle_timeout_is_a_pause_not_an_error() {
    let config = BabamulConfig::from_env().timeout(Duration::from_secs(1));
    let mut consumer = AlertConsumer::new(["babamul.ztf.*.hosted"], config).unwrap();
    consumer.open().await.unwrap();

    let start = Instant::now();
    let first = consumer.next().await.unwrap();
    assert!(first.is_none());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(5));

    // the subscription is still live after a timeout
    let second = consumer.next().await.unwrap();
    assert!(second.is_none());
    consumer.close();
}

#[tokio::test]
#[ignore = "requires a live broker"]
async fn test_misspelled_pattern_fails_at_subscribe_time() {
    let config = BabamulConfig::from_env();
    let mut consumer =
        AlertConsumer::new(["babamul.zft.*.hosted"], config).unwrap();
    let err = consumer.open().await.unwrap_err();
    assert!(matches!(err, BabamulError::NoMatchingTopics { .. }), "{:?}", err);
}
