//! matchq: capability-matching job queue.
//!
//! Routes jobs to heterogeneous consumers by matching producer-declared
//! requirements against consumer-offered capabilities, instead of strictly
//! FIFO delivery. Jobs fan out into per-requirement slots over a shared
//! key/value store; consumers drain the highest-priority slot their offer
//! satisfies.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use matchq::{FeatureQueue, MjdlFactory, RedisStore, UdpNotifier};
//! use serde_json::json;
//!
//! let store = RedisStore::connect("redis://localhost:6379", "mq/").await?;
//! let notifier = Arc::new(UdpNotifier::bind().await?);
//! let queue = FeatureQueue::new("build", store)
//!     .with_factory(MjdlFactory)
//!     .with_notifier(notifier);
//!
//! queue.push("job-1", Some(&json!({"platform": "x86_64", "memory": 512, "priority": 5}))).await?;
//! let job = queue.pop(Some(&json!({"platform": "x86_64", "memory": 2048}))).await?;
//! ```

pub mod error;
pub mod features;
pub mod notifier;
pub mod queue;
pub mod store;

// Re-export commonly used types
pub use error::QueueError;
pub use features::{
    FeatureFactory, FeatureMatcher, FeatureOffer, FeatureRequirement, FormatError, MjdlFactory,
    MjdlOffer, MjdlRequirement, StoredRequirement,
};
pub use notifier::{NotificationSink, QueueEvent, UdpNotifier};
pub use queue::{FeatureQueue, DEFAULT_SLOT, NOTIFY_TARGETS_PARAM};
pub use store::{ListPriority, MemoryStore, RedisStore, Store, StoreError};
