//! Subscriber installation. Kept in its own binary because it installs the
//! process-wide subscriber.

use climate_chamber::telemetry::init_tracing;

#[test]
fn second_init_is_a_noop() {
    assert!(init_tracing("climate_chamber=debug"));
    assert!(!init_tracing("climate_chamber=trace"));
    tracing::info!("subscriber installed");
}
