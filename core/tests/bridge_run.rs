use core_test_support::FakeRemoteApi;
use core_test_support::RecordingPublisher;
use core_test_support::ScriptedSource;
use core_test_support::snapshot_json;
use core_test_support::test_config;
use factory_bridge_core::Bridge;
use factory_bridge_core::remote::Originator;
use factory_bridge_core::transport::InboundMessage;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;

const ROOT: &str = "/Mobius/ae1/factory_car";

async fn wait_until<F>(mut done: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polls_relays_and_stores_until_shutdown() {
    let api = Arc::new(FakeRemoteApi::new());
    let publisher = Arc::new(RecordingPublisher::new());
    let bridge = Bridge::new(test_config(), api.clone(), publisher.clone()).expect("bridge");
    let source = Arc::new(ScriptedSource::new([
        snapshot_json(1, &[("boilers", vec![json!({"unit_number": 1})])]),
        snapshot_json(
            2,
            &[(
                "boilers",
                vec![json!({"unit_number": 1}), json!({"unit_number": 2})],
            )],
        ),
    ]));
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let topic = format!("{ROOT}/boilers/boilers_1");

    let driver = async {
        wait_until(|| publisher.published().len() == 3).await;
        inbound_tx
            .send(InboundMessage {
                topic: topic.clone(),
                payload: br#"{"tick": 2}"#.to_vec().into(),
            })
            .await
            .expect("inbound queued");
        wait_until(|| !api.records().is_empty()).await;
        shutdown_tx.send_replace(true);
    };
    tokio::join!(bridge.run(source, inbound_rx, shutdown_rx), driver);

    let ticks: Vec<_> = publisher
        .published()
        .into_iter()
        .map(|(_, payload)| payload["tick"].clone())
        .collect();
    assert_eq!(ticks.iter().filter(|tick| **tick == json!(2)).count(), 2);
    assert_eq!(api.records(), vec![(topic, json!({"tick": 2}), Originator::Primary)]);
    assert_eq!(bridge.stats().snapshots_relayed, 2);
    assert_eq!(api.created_containers().len(), 4);
}

#[tokio::test]
async fn returns_when_the_shutdown_sender_is_dropped() {
    let bridge = Bridge::new(
        test_config(),
        Arc::new(FakeRemoteApi::new()),
        Arc::new(RecordingPublisher::new()),
    )
    .expect("bridge");
    let (_inbound_tx, inbound_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(shutdown_tx);

    tokio::time::timeout(
        Duration::from_secs(5),
        bridge.run(Arc::new(ScriptedSource::default()), inbound_rx, shutdown_rx),
    )
    .await
    .expect("run returns");
}
