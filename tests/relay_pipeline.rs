mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prediction_relay::application::{PredictionFixture, RecordedLabelClassifier, replay_fixtures};
use async_trait::async_trait;
use prediction_relay::domain::repository::{MessageListener, ResultStore};
use prediction_relay::service::attach_relay;
use prediction_relay::{
    BrokerClient, BrokerState, InboundMessage, PredictionRecord, RelayError, RelayMetrics, RelayResult, SendOutcome,
};

use support::{LoopbackInbound, LoopbackOutbound, TopicHandle, WARM_UP, loopback, ready_store, wait_for_rows};

type TestBroker = BrokerClient<LoopbackOutbound, LoopbackInbound>;

fn broker_with(
    outbound: LoopbackOutbound,
    inbound: LoopbackInbound,
) -> (TestBroker, Arc<RelayMetrics>) {
    let metrics = Arc::new(RelayMetrics::new());
    let broker = BrokerClient::from_channels(outbound, inbound, WARM_UP, Arc::clone(&metrics));
    (broker, metrics)
}

fn broker(ack_delay: Duration) -> (TestBroker, Arc<RelayMetrics>, TopicHandle) {
    let (outbound, inbound, topic) = loopback(ack_delay);
    let (broker, metrics) = broker_with(outbound, inbound);
    (broker, metrics, topic)
}

fn example() -> PredictionRecord {
    PredictionRecord::new("Jeopardy!", "post-2002", "capital of france", 400)
}

#[tokio::test]
async fn sent_prediction_is_persisted() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();
    assert_eq!(broker.state(), BrokerState::Listening);

    let outcome = broker.send(&example()).await;
    assert_eq!(outcome, SendOutcome::Acknowledged);

    let rows = wait_for_rows(&store, 1).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].matches(&example()));
    assert!(rows[0].id >= 1);
    assert_eq!(metrics.messages_persisted_total.get(), 1);

    broker.shutdown().await;
}

#[tokio::test]
async fn rows_follow_send_order() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), metrics).unwrap();

    let records: Vec<PredictionRecord> = (0..20)
        .map(|i| PredictionRecord::new("Double Jeopardy!", "pre-2002", format!("question {i}"), i * 100))
        .collect();
    for record in &records {
        assert!(broker.send(record).await.is_acknowledged());
    }

    let rows = wait_for_rows(&store, records.len()).await;
    for (row, record) in rows.iter().zip(&records) {
        assert!(row.matches(record), "row {row:?} does not match {record:?}");
    }
    assert!(rows.windows(2).all(|pair| pair[0].id < pair[1].id));

    broker.shutdown().await;
}

#[tokio::test]
async fn malformed_message_does_not_stop_the_listener() {
    let (broker, metrics, topic) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();

    topic.inject_raw(br#"{"round":"Jeopardy!","air_date_group":"post-2002","question":"first","value":200}"#);
    topic.inject_raw(br#"{"round":"Jeopardy!","air_date_group":"post-2002","question":"broken"}"#);
    topic.inject_raw(br#"{"round":"Jeopardy!","air_date_group":"post-2002","question":"second","value":600}"#);

    let rows = wait_for_rows(&store, 2).await;
    assert_eq!(rows[0].question, "first");
    assert_eq!(rows[1].question, "second");
    assert_eq!(metrics.messages_malformed_total.get(), 1);
    assert_eq!(broker.listener_count(), 1);

    // 循环仍在运行
    assert!(broker.send(&example()).await.is_acknowledged());
    let rows = wait_for_rows(&store, 3).await;
    assert!(rows[2].matches(&example()));
    assert_eq!(metrics.messages_received_total.get(), 4);

    broker.shutdown().await;
}

#[tokio::test]
async fn failed_insert_is_logged_and_skipped() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    store.fail_next_inserts(1);
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();

    let lost = PredictionRecord::new("Jeopardy!", "post-2002", "lost", 100);
    broker.send(&lost).await;
    broker.send(&example()).await;

    let rows = wait_for_rows(&store, 1).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].matches(&example()));
    assert_eq!(metrics.persistence_failures_total.get(), 1);
    assert_eq!(broker.listener_count(), 1);

    broker.shutdown().await;
}

#[tokio::test]
async fn send_waits_for_broker_acknowledgement() {
    let delay = Duration::from_millis(200);
    let (broker, _, _) = broker(delay);

    let started = Instant::now();
    let outcome = broker.send(&example()).await;

    assert_eq!(outcome, SendOutcome::Acknowledged);
    assert!(started.elapsed() >= delay, "send returned after {:?}", started.elapsed());
}

#[tokio::test]
async fn submit_timeout_is_reported_without_error() {
    let (outbound, inbound, _) = loopback(Duration::ZERO);
    let (broker, metrics) = broker_with(outbound.timing_out(), inbound);

    let outcome = broker.send(&example()).await;

    assert_eq!(outcome, SendOutcome::TimedOut);
    assert_eq!(metrics.published(&SendOutcome::TimedOut), 1);
    assert_eq!(broker.state(), BrokerState::Connected);
}

#[tokio::test]
async fn message_seen_during_warm_up_is_not_lost() {
    let (broker, metrics, topic) = broker(Duration::ZERO);
    let store = ready_store().await;
    topic.inject_raw(br#"{"round":"Final Jeopardy!","air_date_group":"pre-2002","question":"early","value":0}"#);

    attach_relay(&broker, Arc::clone(&store), metrics).unwrap();

    let rows = wait_for_rows(&store, 1).await;
    assert_eq!(rows[0].question, "early");

    broker.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_a_listener_blocked_on_receive() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();
    tokio::time::sleep(WARM_UP * 2).await;

    tokio::time::timeout(Duration::from_secs(1), broker.shutdown())
        .await
        .expect("listener did not observe shutdown");

    assert_eq!(broker.state(), BrokerState::Closed);
    assert_eq!(broker.listener_count(), 0);
    assert!(matches!(broker.send(&example()).await, SendOutcome::Rejected(_)));
    assert!(matches!(
        attach_relay(&broker, store, metrics),
        Err(RelayError::ClientClosed)
    ));

    // 重复关闭无副作用
    broker.shutdown().await;
    assert_eq!(broker.state(), BrokerState::Closed);
}

#[tokio::test]
async fn closed_store_fails_inserts_while_the_loop_keeps_running() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();

    store.close().await.unwrap();
    assert!(matches!(
        store.insert("r", "g", "q", 1).await,
        Err(RelayError::Persistence { .. })
    ));

    broker.send(&example()).await;
    let deadline = Instant::now() + Duration::from_secs(5);
    while metrics.persistence_failures_total.get() == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(metrics.persistence_failures_total.get(), 1);
    assert_eq!(broker.listener_count(), 1);
    broker.shutdown().await;
}

#[tokio::test]
async fn replayed_fixtures_reach_the_store() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), metrics).unwrap();

    let fixtures = vec![
        PredictionFixture::from_slice(
            Path::new("test_0.json"),
            br#"{"X":[{"Round":"Jeopardy!","air_date_group":"post-2002","Question":"capital of france"}],"y":[{"Value":400}]}"#,
        )
        .unwrap(),
        PredictionFixture::from_slice(
            Path::new("test_1.json"),
            br#"{"X":[{"Round":"Jeopardy!","air_date_group":"pre-2002","Question":"no label"}],"y":[]}"#,
        )
        .unwrap(),
    ];

    let summary = replay_fixtures(&fixtures, &RecordedLabelClassifier, &broker).await;

    assert_eq!(summary.acknowledged, 1);
    assert_eq!(summary.skipped, 1);
    let rows = wait_for_rows(&store, 1).await;
    assert!(rows[0].matches(&example()));

    broker.shutdown().await;
}

#[tokio::test]
async fn second_listener_runs_an_independent_loop() {
    let (broker, metrics, _) = broker(Duration::ZERO);
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();

    assert_eq!(broker.state(), BrokerState::Listening);
    assert_eq!(broker.listener_count(), 2);

    for i in 0..4 {
        let record = PredictionRecord::new("Jeopardy!", "post-2002", format!("question {i}"), i);
        assert!(broker.send(&record).await.is_acknowledged());
    }
    let rows = wait_for_rows(&store, 4).await;
    assert_eq!(rows.len(), 4);

    broker.shutdown().await;
    assert_eq!(broker.listener_count(), 0);
    assert_eq!(broker.state(), BrokerState::Closed);
}

#[tokio::test]
async fn shutdown_before_first_poll_leaves_messages_untouched() {
    let (broker, metrics, topic) = broker(Duration::ZERO);
    let store = ready_store().await;
    topic.inject_raw(br#"{"round":"Jeopardy!","air_date_group":"post-2002","question":"pending","value":100}"#);

    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();
    // 单线程运行时下后台任务尚未被调度，循环必须在首次拉取前看到关闭信号
    broker.shutdown().await;

    assert_eq!(broker.state(), BrokerState::Closed);
    assert_eq!(metrics.messages_received_total.get(), 0);
    assert!(store.fetch_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_interrupts_the_warm_up_poll() {
    let (outbound, inbound, _) = loopback(Duration::ZERO);
    let metrics = Arc::new(RelayMetrics::new());
    let broker = BrokerClient::from_channels(outbound, inbound, Duration::from_secs(30), Arc::clone(&metrics));
    let store = ready_store().await;
    attach_relay(&broker, Arc::clone(&store), Arc::clone(&metrics)).unwrap();

    // 让循环进入首次有界拉取
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(broker.listener_count(), 1);

    tokio::time::timeout(Duration::from_secs(1), broker.shutdown())
        .await
        .expect("warm-up poll was not interrupted");
    assert_eq!(broker.state(), BrokerState::Closed);
    assert_eq!(broker.listener_count(), 0);
}

/// 每条消息处理前先停顿的监听器
struct SlowListener {
    delay: Duration,
    metrics: Arc<RelayMetrics>,
}

#[async_trait]
impl MessageListener for SlowListener {
    async fn on_message(&self, _message: &InboundMessage) -> RelayResult<()> {
        tokio::time::sleep(self.delay).await;
        self.metrics.messages_persisted_total.inc();
        Ok(())
    }
}

#[tokio::test]
async fn concurrent_shutdown_waits_until_closed() {
    let (broker, metrics, topic) = broker(Duration::ZERO);
    broker
        .register_listener(SlowListener {
            delay: Duration::from_millis(300),
            metrics: Arc::clone(&metrics),
        })
        .unwrap();

    topic.inject_raw(b"{}");
    let deadline = Instant::now() + Duration::from_secs(5);
    while metrics.messages_received_total.get() == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(metrics.messages_received_total.get(), 1);

    let (_, later_state) = tokio::join!(broker.shutdown(), async {
        tokio::task::yield_now().await;
        assert_eq!(broker.state(), BrokerState::Closing);
        broker.shutdown().await;
        broker.state()
    });

    assert_eq!(later_state, BrokerState::Closed);
    assert_eq!(metrics.messages_persisted_total.get(), 1);
}
