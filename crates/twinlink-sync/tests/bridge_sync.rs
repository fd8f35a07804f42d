// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! End-to-end sync engine scenarios over a mock transport and the
//! in-memory repository.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{broadcast, mpsc};

use support::{fast_pool_settings, wait_for, MockTransport, SharedTransportFactory};
use twinlink_aas::client::{AasRepository, MemoryRepository};
use twinlink_aas::events::ElementChanged;
use twinlink_core::address::{ElementRef, NodeId, NodeRef};
use twinlink_core::audit::{AuditOutcome, InMemoryAuditSink, RejectReason};
use twinlink_core::dedup::SuppressionCache;
use twinlink_core::registry::{Mapping, MappingRegistry, ValueRange};
use twinlink_core::variant::Variant;
use twinlink_core::xsd::XsdType;
use twinlink_opcua::pool::ConnectionPool;
use twinlink_opcua::types::EndpointSettings;
use twinlink_sync::{Controller, NodeValueCache, SyncManager, SyncSettings};

const ENDPOINT: &str = "plant";
const SUBMODEL: &str = "urn:factory:submodel:sensors";

fn temperature_mapping() -> Mapping {
    Mapping::new(
        NodeRef::new(ENDPOINT, NodeId::string(2, "Temperature")),
        ElementRef::new(SUBMODEL, "Temperature"),
        XsdType::Double,
    )
}

fn temperature_element() -> ElementRef {
    ElementRef::new(SUBMODEL, "Temperature")
}

fn temperature_node() -> NodeId {
    NodeId::string(2, "Temperature")
}

fn pool_for(transport: Arc<MockTransport>) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(
        vec![EndpointSettings::insecure(ENDPOINT, "opc.tcp://localhost:4840")],
        &SharedTransportFactory(transport),
        fast_pool_settings(),
    ))
}

struct Harness {
    manager: SyncManager,
    transport: Arc<MockTransport>,
    repository: Arc<MemoryRepository>,
}

async fn start_harness(mappings: Vec<Mapping>, auto_create: bool) -> Harness {
    let transport = MockTransport::new();
    let repository = Arc::new(MemoryRepository::new());
    let pool = pool_for(Arc::clone(&transport));

    let registry = Arc::new(MappingRegistry::new(mappings).unwrap());
    let mut manager = SyncManager::new(
        registry,
        pool,
        Arc::clone(&repository) as Arc<dyn AasRepository>,
        None,
        Arc::new(InMemoryAuditSink::new()) as Arc<dyn twinlink_core::audit::AuditSink>,
        Arc::new(SuppressionCache::default()),
        SyncSettings {
            rest_workers: 2,
            queue_capacity: 64,
            shutdown_grace: Duration::from_secs(1),
            poll_interval: Duration::from_millis(25),
            auto_create_submodels: auto_create,
            auto_create_elements: auto_create,
        },
    );
    manager.start().await.unwrap();

    let harness = Harness {
        manager,
        transport,
        repository,
    };
    // The monitor's subscription is applied on the supervisor's next tick.
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness.transport.subscription_count() >= 1
        })
        .await,
        "subscription should be applied"
    );
    harness
}

#[tokio::test]
async fn numeric_happy_path_reaches_aas_without_opc_write() {
    // S1: OPC publishes 42.0, AAS receives it, and no OPC write follows.
    let element = temperature_element();
    let mut harness = start_harness(vec![temperature_mapping()], false).await;
    harness.repository.seed(element.clone(), json!(0.0));

    harness
        .transport
        .emit(temperature_node(), Variant::Double(42.0));
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness.repository.value(&element) == Some(json!(42.0))
        })
        .await,
        "AAS should receive the new value"
    );

    // Give the poller a few passes to try to echo it back.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        harness.transport.writes().is_empty(),
        "no OPC write may follow the OPC-originated change"
    );

    harness.manager.stop().await;
}

#[tokio::test]
async fn reverse_path_writes_opc_and_suppresses_echo() {
    // S2: an AAS-side change reaches OPC UA; the induced data change is
    // not written back to AAS.
    let element = temperature_element();
    let mut harness = start_harness(vec![temperature_mapping()], false).await;
    harness.repository.seed(element.clone(), json!(42.0));

    // Let the poller record its baseline.
    tokio::time::sleep(Duration::from_millis(120)).await;

    // External AAS write.
    harness.repository.seed(element.clone(), json!(55.0));
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness
                .transport
                .writes()
                .iter()
                .any(|(_, v)| *v == Variant::Double(55.0))
        })
        .await,
        "OPC write of 55.0 should be issued"
    );

    // The induced data change must be suppressed.
    let writes_before = harness.repository.write_count();
    harness
        .transport
        .emit(temperature_node(), Variant::Double(55.0));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        harness.repository.write_count(),
        writes_before,
        "the echo of our own OPC write must not be re-written to AAS"
    );

    harness.manager.stop().await;
}

#[tokio::test]
async fn auto_create_provisions_missing_element() {
    // S6: first OPC change on an unmapped AAS element creates it, then
    // writes the value.
    let element = temperature_element();
    let mut harness = start_harness(vec![temperature_mapping()], true).await;

    harness
        .transport
        .emit(temperature_node(), Variant::Double(7.5));
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness.repository.value(&element) == Some(json!(7.5))
        })
        .await,
        "element should be created and populated"
    );
    assert!(harness.repository.has_submodel(SUBMODEL));

    harness.manager.stop().await;
}

#[tokio::test]
async fn subsequent_different_value_still_propagates() {
    // Loop suppression must not swallow genuine changes after an echo.
    let element = temperature_element();
    let mut harness = start_harness(vec![temperature_mapping()], false).await;
    harness.repository.seed(element.clone(), json!(0.0));

    harness
        .transport
        .emit(temperature_node(), Variant::Double(41.0));
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness.repository.value(&element) == Some(json!(41.0))
        })
        .await
    );

    harness
        .transport
        .emit(temperature_node(), Variant::Double(42.5));
    assert!(
        wait_for(Duration::from_secs(2), || {
            harness.repository.value(&element) == Some(json!(42.5))
        })
        .await,
        "a different value must propagate"
    );

    harness.manager.stop().await;
}

// =============================================================================
// Controller-level scenarios (deterministic event injection)
// =============================================================================

struct ControllerHarness {
    controller: Arc<Controller>,
    events: mpsc::Sender<ElementChanged>,
    shutdown: broadcast::Sender<()>,
    transport: Arc<MockTransport>,
    audit: Arc<InMemoryAuditSink>,
    suppression: Arc<SuppressionCache>,
}

async fn start_controller(mappings: Vec<Mapping>) -> ControllerHarness {
    let transport = MockTransport::new();
    let pool = pool_for(Arc::clone(&transport));
    pool.start().await.unwrap();
    assert!(wait_for(Duration::from_secs(1), || pool.all_connected()).await);

    let registry = Arc::new(MappingRegistry::new(mappings).unwrap());
    let suppression = Arc::new(SuppressionCache::default());
    let audit = Arc::new(InMemoryAuditSink::new());
    let controller = Arc::new(Controller::new(
        pool,
        registry,
        Arc::clone(&suppression),
        Arc::new(NodeValueCache::new()),
        Arc::clone(&audit) as Arc<dyn twinlink_core::audit::AuditSink>,
    ));

    let (events, events_rx) = mpsc::channel(64);
    let (shutdown, _) = broadcast::channel(1);
    Arc::clone(&controller).start(events_rx, shutdown.subscribe());

    ControllerHarness {
        controller,
        events,
        shutdown,
        transport,
        audit,
        suppression,
    }
}

fn changed(value: serde_json::Value) -> ElementChanged {
    ElementChanged {
        element: temperature_element(),
        value,
        user: None,
    }
}

#[tokio::test]
async fn range_violation_is_audited_and_not_written() {
    // S3: value 150 against range [0, 100] → Rejected(RangeError).
    let mapping = temperature_mapping().with_range(ValueRange::new(0.0, 100.0).unwrap());
    let harness = start_controller(vec![mapping]).await;

    harness.events.send(changed(json!(150.0))).await.unwrap();
    assert!(
        wait_for(Duration::from_secs(1), || harness.audit.len() == 1).await,
        "rejection must be audited"
    );

    let records = harness.audit.records();
    assert_eq!(
        records[0].outcome,
        AuditOutcome::rejected(RejectReason::RangeError)
    );
    assert!(harness.transport.writes().is_empty(), "OPC node unchanged");

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn type_violation_is_audited_and_not_written() {
    // S4: value "abc" against xs:int → Rejected(TypeError).
    let mut mapping = temperature_mapping();
    mapping.value_type = XsdType::Int;
    let harness = start_controller(vec![mapping]).await;

    harness.events.send(changed(json!("abc"))).await.unwrap();
    assert!(wait_for(Duration::from_secs(1), || harness.audit.len() == 1).await);

    let records = harness.audit.records();
    assert_eq!(
        records[0].outcome,
        AuditOutcome::rejected(RejectReason::TypeError)
    );
    assert!(harness.transport.writes().is_empty());

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn accepted_write_carries_user_identity() {
    let harness = start_controller(vec![temperature_mapping()]).await;

    harness
        .events
        .send(ElementChanged {
            element: temperature_element(),
            value: json!(55.0),
            user: Some("alice".to_string()),
        })
        .await
        .unwrap();

    assert!(wait_for(Duration::from_secs(1), || harness.audit.len() == 1).await);
    let records = harness.audit.records();
    assert_eq!(records[0].outcome, AuditOutcome::Accepted);
    assert_eq!(records[0].user_id.as_deref(), Some("alice"));
    assert_eq!(records[0].new_value, Some(twinlink_core::xsd::XsdValue::Double(55.0)));

    let writes = harness.transport.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1, Variant::Double(55.0));

    // The write was remembered for echo suppression.
    assert_eq!(harness.suppression.len(), 1);

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn overlapping_events_coalesce_to_latest() {
    // Property: at most one in-flight write per element; the later value
    // wins when events overlap.
    let harness = start_controller(vec![temperature_mapping()]).await;
    harness.transport.set_write_delay(Duration::from_millis(80));

    harness.events.send(changed(json!(1.0))).await.unwrap();
    // Arrive while the first write is still in flight.
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.events.send(changed(json!(2.0))).await.unwrap();
    harness.events.send(changed(json!(3.0))).await.unwrap();

    assert!(
        wait_for(Duration::from_secs(2), || {
            harness
                .transport
                .writes()
                .iter()
                .any(|(_, v)| *v == Variant::Double(3.0))
        })
        .await,
        "latest value must be written"
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let values: Vec<Variant> = harness.transport.writes().into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, vec![Variant::Double(1.0), Variant::Double(3.0)]);
    assert_eq!(
        harness.controller.stats().coalesced.load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn echo_event_is_suppressed() {
    // Property 3 on the controller side: an event matching a remembered
    // Monitor write is dropped as an echo.
    let harness = start_controller(vec![temperature_mapping()]).await;
    let value = twinlink_core::xsd::XsdValue::Double(42.0);
    harness
        .suppression
        .insert(&temperature_element(), twinlink_core::codec::hash(&value));

    harness.events.send(changed(json!(42.0))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(harness.transport.writes().is_empty());
    assert!(harness.audit.is_empty(), "suppressed echoes are not write attempts");

    let _ = harness.shutdown.send(());
}
