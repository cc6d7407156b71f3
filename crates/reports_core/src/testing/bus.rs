//! Message bus helpers for integration tests.
//!
//! # Responsibility
//! - Decide whether integration tests get a broker (`TEST_NATS_DOCKER`).
//! - Open per-test connections on the fixed test cluster or on the cluster
//!   named by `NATS_CLUSTER_ID`.
//!
//! Connections close themselves when dropped, so a failing test never leaves
//! its client id registered.

use crate::bus::{BusConnection, BusResult, BusSettings, LocalBroker};
use log::info;

pub const TEST_CLUSTER_ID: &str = "test-cluster";
pub const BROKER_TOGGLE_ENV: &str = "TEST_NATS_DOCKER";

/// `true` when the toggle variable is set to a non-empty value.
pub fn integration_broker_requested(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(BROKER_TOGGLE_ENV).is_some_and(|value| !value.trim().is_empty())
}

/// Starts a broker for integration tests when requested.
///
/// The broker always serves [`TEST_CLUSTER_ID`], plus the cluster named by
/// `NATS_CLUSTER_ID` when it is set, so plain and entity clients can share it.
pub fn start_integration_broker(
    lookup: impl Fn(&str) -> Option<String>,
) -> BusResult<Option<LocalBroker>> {
    if !integration_broker_requested(&lookup) {
        return Ok(None);
    }

    let mut clusters = vec![TEST_CLUSTER_ID.to_string()];
    if let Ok(settings) = BusSettings::from_lookup(&lookup) {
        clusters.push(settings.cluster_id);
    }
    let broker = LocalBroker::serve(clusters)?;
    info!(
        "event=integration_broker_start module=testing status=ok clusters={}",
        broker.clusters().join(",")
    );
    Ok(Some(broker))
}

/// Connects `client_id` to the fixed test cluster.
pub async fn connect_test_client(
    broker: &LocalBroker,
    client_id: &str,
) -> BusResult<BusConnection> {
    broker.connect(TEST_CLUSTER_ID, client_id).await
}

/// Connects `client_id` to the cluster named by `NATS_CLUSTER_ID`.
///
/// # Errors
/// - `BusError::Config` when `NATS_CLUSTER_ID` is missing.
pub async fn connect_entity_client(
    broker: &LocalBroker,
    client_id: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> BusResult<BusConnection> {
    let settings = BusSettings::from_lookup(lookup)?;
    broker.connect(&settings.cluster_id, client_id).await
}
