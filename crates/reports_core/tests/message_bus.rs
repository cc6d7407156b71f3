use reports_core::bus::{BusError, LocalBroker, CLUSTER_ID_ENV};
use reports_core::config::ConfigError;
use reports_core::testing::bus::{
    connect_entity_client, connect_test_client, integration_broker_requested,
    start_integration_broker, BROKER_TOGGLE_ENV, TEST_CLUSTER_ID,
};
use reports_core::testing::unique_client_id;
use std::collections::HashMap;
use std::time::Duration;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[tokio::test]
async fn published_messages_reach_subscribers_in_sequence() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();
    let publisher = connect_test_client(&broker, &unique_client_id()).await.unwrap();
    let listener = connect_test_client(&broker, &unique_client_id()).await.unwrap();

    let mut subscription = listener.subscribe("project.saved").await.unwrap();
    assert_eq!(publisher.publish("project.saved", "first").await.unwrap(), 1);
    assert_eq!(publisher.publish("project.saved", "second").await.unwrap(), 2);

    let first = tokio::time::timeout(Duration::from_secs(1), subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(first.payload, b"first".to_vec());
    let second = subscription.next().await.unwrap();
    assert_eq!(second.sequence, 2);
    assert_eq!(second.subject, "project.saved");
}

#[tokio::test]
async fn subjects_keep_independent_sequences() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();
    let client = connect_test_client(&broker, &unique_client_id()).await.unwrap();

    assert_eq!(client.publish("staff.saved", "a").await.unwrap(), 1);
    assert_eq!(client.publish("project.saved", "b").await.unwrap(), 1);
    assert_eq!(client.publish("staff.saved", "c").await.unwrap(), 2);
}

#[tokio::test]
async fn client_ids_are_unique_per_broker() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();
    let _first = connect_test_client(&broker, "reports-worker").await.unwrap();

    let err = connect_test_client(&broker, "reports-worker")
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::DuplicateClientId(id) if id == "reports-worker"));
}

#[tokio::test]
async fn unknown_cluster_is_rejected() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();

    let err = broker
        .connect("other-cluster", &unique_client_id())
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::UnknownCluster { .. }));
}

#[tokio::test]
async fn dropped_and_closed_connections_are_deregistered() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();

    let dropped = connect_test_client(&broker, "dropped").await.unwrap();
    let closed = connect_test_client(&broker, "closed").await.unwrap();
    assert_eq!(
        broker.connected_clients(TEST_CLUSTER_ID).await.unwrap(),
        vec!["closed".to_string(), "dropped".to_string()]
    );

    drop(dropped);
    closed.close().await.unwrap();
    assert!(broker
        .connected_clients(TEST_CLUSTER_ID)
        .await
        .unwrap()
        .is_empty());

    connect_test_client(&broker, "dropped").await.unwrap();
}

#[tokio::test]
async fn invalid_subject_is_rejected() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();
    let client = connect_test_client(&broker, &unique_client_id()).await.unwrap();

    let err = client.publish("project saved", "x").await.unwrap_err();
    assert!(matches!(err, BusError::InvalidSubject(_)));
}

#[tokio::test]
async fn entity_client_requires_cluster_id() {
    let broker = LocalBroker::start(TEST_CLUSTER_ID).unwrap();

    let err = connect_entity_client(&broker, &unique_client_id(), lookup(&[]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BusError::Config(ConfigError::MissingEnv(CLUSTER_ID_ENV))
    ));
    assert_eq!(err.to_string(), "Missing env variable: NATS_CLUSTER_ID");
}

#[tokio::test]
async fn integration_broker_serves_test_and_entity_clusters() {
    let env = lookup(&[(BROKER_TOGGLE_ENV, "1"), (CLUSTER_ID_ENV, "entity-cluster")]);

    let broker = start_integration_broker(&env).unwrap().unwrap();
    assert!(broker.serves(TEST_CLUSTER_ID));
    assert!(broker.serves("entity-cluster"));

    let client_id = unique_client_id();
    let plain = connect_test_client(&broker, &client_id).await.unwrap();
    let entity = connect_entity_client(&broker, &client_id, &env)
        .await
        .unwrap();
    assert_eq!(plain.cluster_id(), TEST_CLUSTER_ID);
    assert_eq!(entity.cluster_id(), "entity-cluster");

    let mut entity_events = entity.subscribe("project.saved").await.unwrap();
    assert_eq!(plain.publish("project.saved", "plain").await.unwrap(), 1);
    assert_eq!(entity.publish("project.saved", "entity").await.unwrap(), 1);
    let delivered = entity_events.next().await.unwrap();
    assert_eq!(delivered.payload, b"entity".to_vec());
}

#[tokio::test]
async fn integration_broker_is_skipped_without_the_toggle() {
    assert!(!integration_broker_requested(lookup(&[(BROKER_TOGGLE_ENV, " ")])));
    assert!(start_integration_broker(lookup(&[])).unwrap().is_none());

    let broker = start_integration_broker(lookup(&[(BROKER_TOGGLE_ENV, "true")]))
        .unwrap()
        .unwrap();
    assert_eq!(broker.clusters(), [TEST_CLUSTER_ID.to_string()]);
}

#[tokio::test]
async fn broker_serving_several_clusters_rejects_others() {
    let broker = LocalBroker::serve([TEST_CLUSTER_ID, "entity-cluster", TEST_CLUSTER_ID]).unwrap();
    assert_eq!(broker.clusters().len(), 2);

    let err = broker
        .connect("other-cluster", &unique_client_id())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "unknown cluster `other-cluster`; broker serves `test-cluster`, `entity-cluster`"
    );
}

#[test]
fn broker_needs_a_runtime() {
    assert!(matches!(
        LocalBroker::start(TEST_CLUSTER_ID),
        Err(BusError::NoRuntime)
    ));
}
