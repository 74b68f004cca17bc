// tests/bus_test.rs — Integration test: feedback bus with a live dispatch loop

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use breakthrough::bus::{
    BusConfig, FeedbackBus, FeedbackMessage, MessageType, Payload, Priority, PublishOptions,
    SubscriberScope, Target, TypeFilter,
};

fn config(queue_capacity: usize) -> BusConfig {
    BusConfig {
        queue_capacity,
        dispatch_interval: Duration::from_millis(5),
        batch_size: 10,
        history_size: 100,
    }
}

fn error(message: &str) -> Payload {
    Payload::Error {
        message: message.to_string(),
    }
}

fn opts(priority: Priority) -> PublishOptions {
    PublishOptions {
        priority,
        iteration: 1,
    }
}

fn recorder(bus: &FeedbackBus, scope: SubscriberScope) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(
        scope,
        TypeFilter::All,
        Arc::new(move |msg: &FeedbackMessage| -> anyhow::Result<()> {
            let label = match &msg.payload {
                Payload::Error { message } => message.clone(),
                other => format!("{:?}", other.message_type()),
            };
            sink.lock().unwrap().push(label);
            Ok(())
        }),
    );
    seen
}

#[tokio::test]
async fn test_dispatch_loop_delivers_without_flush() {
    let bus = FeedbackBus::new(config(100));
    let seen = recorder(&bus, SubscriberScope::Any);
    bus.start();

    let (waited, _) = tokio::join!(
        bus.wait_for(MessageType::BreakthroughFound, Duration::from_secs(2)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bus.publish(
                "orchestrator",
                Target::Broadcast,
                Payload::BreakthroughFound {
                    hypothesis_id: "h1".into(),
                    score: 9.4,
                },
                opts(Priority::Critical),
            );
        }
    );

    let msg = waited.unwrap();
    assert!(matches!(msg.payload, Payload::BreakthroughFound { score, .. } if score > 9.0));
    assert_eq!(*seen.lock().unwrap(), vec!["BreakthroughFound".to_string()]);
    bus.stop().await;
    assert!(!bus.is_running());
}

#[tokio::test]
async fn test_wait_for_iteration_matches_only_that_iteration() {
    let bus = FeedbackBus::new(config(100));
    bus.start();

    let (waited, _) = tokio::join!(
        bus.wait_for_iteration(2, Duration::from_secs(2)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            for iteration in 1..=3 {
                bus.publish(
                    "orchestrator",
                    Target::Broadcast,
                    Payload::IterationComplete {
                        iteration,
                        active: 3,
                        eliminated: 0,
                        breakthroughs: 0,
                    },
                    PublishOptions {
                        priority: Priority::Normal,
                        iteration,
                    },
                );
            }
        }
    );

    let msg = waited.unwrap();
    assert!(matches!(msg.payload, Payload::IterationComplete { iteration: 2, .. }));
    bus.stop().await;
}

#[tokio::test]
async fn test_priority_order_within_a_flush() {
    let bus = FeedbackBus::new(config(100));
    let seen = recorder(&bus, SubscriberScope::Any);

    bus.publish("o", Target::Broadcast, error("low"), opts(Priority::Low));
    bus.publish("o", Target::Broadcast, error("normal"), opts(Priority::Normal));
    bus.publish("o", Target::Broadcast, error("critical"), opts(Priority::Critical));
    bus.publish("o", Target::Broadcast, error("high"), opts(Priority::High));

    assert_eq!(bus.flush(), 4);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["critical", "high", "normal", "low"]
    );
}

#[tokio::test]
async fn test_handler_publishing_during_flush_is_delivered() {
    let bus = Arc::new(FeedbackBus::new(config(100)));
    let seen = recorder(&bus, SubscriberScope::Agent("agent-b".into()));

    let relay = Arc::downgrade(&bus);
    bus.subscribe(
        SubscriberScope::Agent("agent-a".into()),
        TypeFilter::only(MessageType::Error),
        Arc::new(move |msg: &FeedbackMessage| -> anyhow::Result<()> {
            if let (Some(bus), Payload::Error { message }) = (relay.upgrade(), &msg.payload) {
                bus.publish(
                    "agent-a",
                    Target::agent("agent-b"),
                    error(&format!("relayed {message}")),
                    PublishOptions::default(),
                );
            }
            Ok(())
        }),
    );

    bus.publish("o", Target::agent("agent-a"), error("ping"), opts(Priority::Normal));
    assert_eq!(bus.flush(), 2);
    assert_eq!(*seen.lock().unwrap(), vec!["relayed ping"]);
    assert_eq!(bus.history().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_waits_for_batch_taken_by_dispatch_loop() {
    let bus = FeedbackBus::new(config(100));
    let started = Arc::new(AtomicBool::new(false));
    let delivered = Arc::new(AtomicUsize::new(0));
    let (s, d) = (started.clone(), delivered.clone());
    bus.subscribe(
        SubscriberScope::Any,
        TypeFilter::All,
        Arc::new(move |_: &FeedbackMessage| -> anyhow::Result<()> {
            s.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    bus.start();

    bus.publish("o", Target::Broadcast, error("slow"), opts(Priority::High));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !started.load(Ordering::SeqCst) {
        assert!(tokio::time::Instant::now() < deadline, "dispatch loop never ran");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // The loop already owns the batch; flush must not return before it lands.
    assert_eq!(bus.flush(), 0);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(bus.queue_len(), 0);
    bus.stop().await;
}

#[tokio::test]
async fn test_stopped_bus_keeps_messages_queued() {
    let bus = FeedbackBus::new(config(100));
    bus.start();
    bus.stop().await;

    bus.publish("o", Target::Broadcast, error("late"), opts(Priority::Normal));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(bus.queue_len(), 1);
    assert!(bus.history().is_empty());
}

#[tokio::test]
async fn test_full_queue_evicts_then_drops() {
    let bus = FeedbackBus::new(config(2));
    bus.publish("o", Target::Broadcast, error("a"), opts(Priority::Normal));
    bus.publish("o", Target::Broadcast, error("b"), opts(Priority::Normal));
    // Evicts "a", the oldest of the lowest priority.
    bus.publish("o", Target::Broadcast, error("c"), opts(Priority::Normal));
    // Everything queued outranks it.
    bus.publish("o", Target::Broadcast, error("d"), opts(Priority::Low));

    let stats = bus.stats();
    assert_eq!(stats.published, 4);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.dropped, 1);

    let seen = recorder(&bus, SubscriberScope::Any);
    bus.flush();
    assert_eq!(*seen.lock().unwrap(), vec!["b", "c"]);
}
