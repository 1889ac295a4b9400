//! End-to-end tests for the queue engine against the in-memory store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use matchq::{
    FeatureQueue, FeatureRequirement, MemoryStore, MjdlFactory, NotificationSink, QueueError,
    QueueEvent, Store,
};

/// Sink that records every event and target update it receives.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<QueueEvent>>,
    targets: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<QueueEvent> {
        self.events.lock().unwrap().clone()
    }

    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: &QueueEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn set_targets(&self, targets: Vec<String>) {
        *self.targets.lock().unwrap() = targets;
    }
}

fn matching_queue(store: MemoryStore, sink: Arc<RecordingSink>) -> FeatureQueue<MemoryStore> {
    FeatureQueue::new("build", store)
        .with_factory(MjdlFactory)
        .with_notifier(sink)
}

fn slot_key(descriptor: Value) -> String {
    use matchq::FeatureFactory;
    MjdlFactory
        .create_requirement(&descriptor)
        .unwrap()
        .slot_key()
}

#[tokio::test]
async fn default_slot_is_fifo() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue: FeatureQueue<MemoryStore> =
        FeatureQueue::new("build", store).with_notifier(sink.clone());

    for job in ["job-1", "job-2", "job-3"] {
        queue.push(job, None).await.unwrap();
    }

    assert_eq!(queue.pop(None).await.unwrap(), Some("job-1".to_string()));
    assert_eq!(queue.pop(None).await.unwrap(), Some("job-2".to_string()));
    assert_eq!(queue.pop(None).await.unwrap(), Some("job-3".to_string()));
    assert_eq!(queue.pop(None).await.unwrap(), None);

    let events = sink.events();
    assert_eq!(events.len(), 8);
    assert_eq!(
        events[3],
        QueueEvent::Dequeue {
            queue: "build".to_string(),
            slot: "default".to_string(),
            job: "job-1".to_string(),
            size: 2,
        }
    );
    // Draining dequeue reports size 0 and is followed by an empty event.
    assert!(matches!(events[5], QueueEvent::Dequeue { size: 0, .. }));
    assert!(matches!(events[6], QueueEvent::Empty { .. }));
    assert_eq!(
        events[7],
        QueueEvent::Miss {
            queue: "build".to_string(),
            slot: Some("default".to_string()),
            offer: None,
        }
    );
}

#[tokio::test]
async fn descriptor_without_factory_uses_default_slot() {
    let store = MemoryStore::new();
    let queue: FeatureQueue<MemoryStore> = FeatureQueue::new("build", store.clone());

    queue
        .push("job-1", Some(&json!({"platform": "x86_64"})))
        .await
        .unwrap();

    assert_eq!(store.list_size("build/queue/default").await.unwrap(), 1);
    assert!(store.set_members("build/feats").await.unwrap().is_empty());
    assert_eq!(queue.pop(None).await.unwrap(), Some("job-1".to_string()));
}

#[tokio::test]
async fn pop_prefers_higher_priority_requirements() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store, sink.clone());

    queue
        .push("job-low", Some(&json!({"platform": "x86_64", "priority": 1})))
        .await
        .unwrap();
    queue
        .push("job-high", Some(&json!({"platform": "x86_64", "priority": 5})))
        .await
        .unwrap();

    let offer = json!({"platform": "x86_64"});
    assert_eq!(
        queue.pop(Some(&offer)).await.unwrap(),
        Some("job-high".to_string())
    );
    assert_eq!(
        queue.pop(Some(&offer)).await.unwrap(),
        Some("job-low".to_string())
    );
    assert_eq!(queue.pop(Some(&offer)).await.unwrap(), None);

    // The exhausted pop reports the offer's descriptive form.
    match sink.events().last().unwrap() {
        QueueEvent::Miss { slot, offer, .. } => {
            assert!(slot.is_none());
            assert_eq!(offer.as_ref().unwrap()["platform"], "x86_64");
        }
        other => panic!("expected miss event, got {other:?}"),
    }
}

#[tokio::test]
async fn priority_separates_slots_and_equal_priority_shares_one() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink);

    // Same platform, different priorities: two independent slots.
    queue
        .push("job-1", Some(&json!({"platform": "x86_64", "priority": 1})))
        .await
        .unwrap();
    queue
        .push("job-2", Some(&json!({"platform": "x86_64", "priority": 5})))
        .await
        .unwrap();
    assert_eq!(store.set_members("build/feats").await.unwrap().len(), 2);

    // Equal priority: both jobs converge on one slot, drained FIFO.
    queue
        .push("job-3", Some(&json!({"platform": "arm64", "priority": 2})))
        .await
        .unwrap();
    queue
        .push("job-4", Some(&json!({"priority": 2, "platform": "arm64"})))
        .await
        .unwrap();
    assert_eq!(store.set_members("build/feats").await.unwrap().len(), 3);
    assert_eq!(
        store
            .list_size(&format!(
                "build/queue/{}",
                slot_key(json!({"platform": "arm64", "priority": 2}))
            ))
            .await
            .unwrap(),
        2
    );

    let arm = json!({"platform": "arm64"});
    assert_eq!(queue.pop(Some(&arm)).await.unwrap(), Some("job-3".to_string()));
    assert_eq!(queue.pop(Some(&arm)).await.unwrap(), Some("job-4".to_string()));
}

#[tokio::test]
async fn drained_slot_is_deregistered_on_next_pop() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink.clone());

    let descriptor = json!({"platform": "x86_64", "priority": 2});
    let slot = slot_key(descriptor.clone());
    queue.push("job-1", Some(&descriptor)).await.unwrap();

    assert_eq!(store.set_members("build/feats").await.unwrap(), vec![slot.clone()]);
    assert!(store
        .get(&format!("build/feats/{slot}"))
        .await
        .unwrap()
        .is_some());

    let offer = json!({"platform": "x86_64"});
    assert_eq!(
        queue.pop(Some(&offer)).await.unwrap(),
        Some("job-1".to_string())
    );
    // Teardown is deferred: the slot stays registered until the next pop
    // observes the list empty.
    assert_eq!(store.set_members("build/feats").await.unwrap(), vec![slot.clone()]);

    assert_eq!(queue.pop(Some(&offer)).await.unwrap(), None);
    assert!(store.set_members("build/feats").await.unwrap().is_empty());
    assert!(store
        .get(&format!("build/feats/{slot}"))
        .await
        .unwrap()
        .is_none());

    let events = sink.events();
    assert!(events.contains(&QueueEvent::Empty {
        queue: "build".to_string(),
        slot,
    }));
}

#[tokio::test]
async fn package_requirements_need_a_superset_offer() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store, sink);

    queue
        .push("job-1", Some(&json!({"packages": ["a", "b"]})))
        .await
        .unwrap();

    assert_eq!(
        queue.pop(Some(&json!({"packages": ["a"]}))).await.unwrap(),
        None
    );
    assert_eq!(
        queue
            .pop(Some(&json!({"packages": ["b", "a", "c"]})))
            .await
            .unwrap(),
        Some("job-1".to_string())
    );
}

#[tokio::test]
async fn malformed_offer_fails_before_any_store_mutation() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink.clone());

    let descriptor = json!({"platform": "x86_64"});
    let slot = slot_key(descriptor.clone());
    queue.push("job-1", Some(&descriptor)).await.unwrap();
    let events_before = sink.events().len();

    let err = queue
        .pop(Some(&json!({"memory": "plenty"})))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Format(_)));

    assert_eq!(store.set_members("build/feats").await.unwrap(), vec![slot.clone()]);
    assert_eq!(
        store.list_size(&format!("build/queue/{slot}")).await.unwrap(),
        1
    );
    assert_eq!(sink.events().len(), events_before);
}

#[tokio::test]
async fn malformed_requirement_fails_before_any_store_mutation() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink.clone());

    let err = queue
        .push("job-1", Some(&json!({"priority": "urgent"})))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Format(_)));

    assert!(store.set_members("build/feats").await.unwrap().is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn unreadable_stored_requirement_is_skipped() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink);

    // A corrupt entry left behind by some earlier writer.
    store.set("build/feats/bogus", "not json").await.unwrap();
    store.set_add("build/feats", "bogus").await.unwrap();

    queue
        .push("job-1", Some(&json!({"platform": "x86_64"})))
        .await
        .unwrap();

    let offer = json!({"platform": "x86_64"});
    assert_eq!(
        queue.pop(Some(&offer)).await.unwrap(),
        Some("job-1".to_string())
    );

    // The corrupt entry is only skipped, never cleaned up by the engine.
    assert_eq!(queue.pop(Some(&offer)).await.unwrap(), None);
    assert_eq!(
        store.set_members("build/feats").await.unwrap(),
        vec!["bogus".to_string()]
    );
}

#[tokio::test]
async fn registered_slot_without_jobs_self_heals() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink);

    // Simulate a producer that crashed between registry-add and list-append.
    let descriptor = json!({"platform": "x86_64"});
    let slot = slot_key(descriptor.clone());
    queue.push("job-1", Some(&descriptor)).await.unwrap();
    store
        .list_pop(&format!("build/queue/{slot}"))
        .await
        .unwrap();

    assert_eq!(queue.pop(Some(&descriptor)).await.unwrap(), None);
    assert!(store.set_members("build/feats").await.unwrap().is_empty());
}

#[tokio::test]
async fn matched_pop_ignores_the_default_slot() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store, sink);

    queue.push("job-1", None).await.unwrap();
    assert_eq!(
        queue.pop(Some(&json!({"platform": "x86_64"}))).await.unwrap(),
        None
    );
    assert_eq!(queue.pop(None).await.unwrap(), Some("job-1".to_string()));
}

#[tokio::test]
async fn config_round_trips_and_reapplies_notify_targets() {
    let store = MemoryStore::new();
    let sink = Arc::new(RecordingSink::default());
    let queue = matching_queue(store.clone(), sink.clone());

    assert_eq!(queue.config_get("retention").await.unwrap(), None);
    queue.config_set("retention", "7").await.unwrap();
    assert_eq!(
        queue.config_get("retention").await.unwrap(),
        Some("7".to_string())
    );
    assert!(store.get("build/config").await.unwrap().is_some());

    queue
        .config_set("notify", "10.0.0.1, monitor:9000")
        .await
        .unwrap();
    assert_eq!(
        sink.targets(),
        vec!["10.0.0.1".to_string(), "monitor:9000".to_string()]
    );
    assert_eq!(
        queue.config_get("notify").await.unwrap(),
        Some("10.0.0.1, monitor:9000".to_string())
    );
}
