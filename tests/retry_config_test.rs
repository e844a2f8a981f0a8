use std::time::Duration;

use slipstream::{Backoff, RetryConfig};

#[test]
fn retry_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.base_delay, Duration::from_secs(2));
    assert_eq!(config.backoff, Backoff::Linear);
    assert_eq!(config.multiplier, 2.0);
    assert_eq!(config.max_delay, Duration::from_secs(60));
}

#[test]
fn retry_config_builder() {
    let config = RetryConfig::new()
        .max_attempts(5)
        .base_delay(Duration::from_millis(100))
        .backoff(Backoff::Exponential)
        .multiplier(3.0)
        .max_delay(Duration::from_secs(10));

    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.base_delay, Duration::from_millis(100));
    assert_eq!(config.backoff, Backoff::Exponential);
    assert_eq!(config.multiplier, 3.0);
    assert_eq!(config.max_delay, Duration::from_secs(10));
}

#[test]
fn retry_config_disabled() {
    let config = RetryConfig::disabled();
    assert_eq!(config.max_attempts, 1);
}

#[test]
fn linear_delay_calculation() {
    let config = RetryConfig::new().base_delay(Duration::from_millis(500));

    // base × n: 500ms, 1s, 1.5s
    assert_eq!(config.delay_for_retry(1), Duration::from_millis(500));
    assert_eq!(config.delay_for_retry(2), Duration::from_millis(1000));
    assert_eq!(config.delay_for_retry(3), Duration::from_millis(1500));
}

#[test]
fn exponential_delay_calculation() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_millis(100))
        .backoff(Backoff::Exponential);

    // base × 2^(n-1): 100ms, 200ms, 400ms, 800ms
    assert_eq!(config.delay_for_retry(1), Duration::from_millis(100));
    assert_eq!(config.delay_for_retry(2), Duration::from_millis(200));
    assert_eq!(config.delay_for_retry(3), Duration::from_millis(400));
    assert_eq!(config.delay_for_retry(4), Duration::from_millis(800));
}

#[test]
fn retry_zero_is_treated_as_first_retry() {
    let config = RetryConfig::new().base_delay(Duration::from_secs(1));
    assert_eq!(config.delay_for_retry(0), Duration::from_secs(1));
}

#[test]
fn delay_capped_at_max() {
    let config = RetryConfig::new()
        .base_delay(Duration::from_secs(1))
        .backoff(Backoff::Exponential)
        .max_delay(Duration::from_secs(5));

    // retry 4 = 1 × 2^3 = 8s, capped at 5s
    assert_eq!(config.delay_for_retry(4), Duration::from_secs(5));
}

#[test]
fn retry_after_is_capped_too() {
    let config = RetryConfig::new().max_delay(Duration::from_secs(5));
    assert_eq!(
        config.effective_delay(1, Some(Duration::from_secs(120))),
        Duration::from_secs(5)
    );
}

#[test]
fn backoff_parses_lowercase() {
    let b: Backoff = serde_json::from_str("\"exponential\"").unwrap();
    assert_eq!(b, Backoff::Exponential);
    assert!(serde_json::from_str::<Backoff>("\"Linear\"").is_err());
}
