//! The capability-matching queue engine.
//!
//! Jobs are fanned out into *slots*: one FIFO list per distinct requirement,
//! keyed by the requirement's deterministic slot key, plus a reserved
//! `"default"` slot for jobs pushed without a descriptor. A registry set
//! tracks which non-default slots are live, and a parallel key/value entry
//! per slot holds the serialized requirement. On pop, every registered
//! requirement is tested against the consumer's offer and the surviving
//! candidates are tried in descending priority order until one slot yields a
//! job.
//!
//! # Consistency
//!
//! The engine holds no locks: all state lives in the [`Store`] and each
//! primitive is atomic on its own, never composed transactionally. Slots are
//! only ever torn down after a `list_pop` observed them empty, so a job that
//! a concurrent push just appended cannot be lost; the worst interleavings
//! leave a registered slot with zero jobs, which the next pop traversal
//! discovers and cleans up.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::features::mjdl::MjdlFactory;
use crate::features::{
    FeatureFactory, FeatureMatcher, FeatureOffer, FeatureRequirement, StoredRequirement,
};
use crate::notifier::{NotificationSink, QueueEvent};
use crate::store::{ListPriority, Store};

/// Slot for jobs pushed without a requirement descriptor.
pub const DEFAULT_SLOT: &str = "default";

/// Config parameter holding the comma-separated notification target list.
pub const NOTIFY_TARGETS_PARAM: &str = "notify";

/// A named job queue bound to a store, an optional capability grammar and an
/// optional notification sink.
pub struct FeatureQueue<S, F = MjdlFactory> {
    name: String,
    store: S,
    factory: Option<F>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl<S: Store, F: FeatureFactory> FeatureQueue<S, F> {
    /// Create a queue with no grammar: every job goes through the default
    /// slot.
    pub fn new(name: impl Into<String>, store: S) -> Self {
        Self {
            name: name.into(),
            store,
            factory: None,
            notifier: None,
        }
    }

    /// Attach the capability grammar used to interpret descriptors.
    pub fn with_factory(mut self, factory: F) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Attach a sink for lifecycle events.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job, optionally with a requirement descriptor.
    ///
    /// With a descriptor and a configured grammar, the job lands in the slot
    /// derived from the requirement's attributes; logically identical
    /// requirements from different producers converge on the same slot.
    /// Without either, the job lands in the default slot.
    ///
    /// # Errors
    ///
    /// Fails with [`QueueError::Format`] on a malformed descriptor, before
    /// any store mutation.
    pub async fn push(&self, job_id: &str, descriptor: Option<&Value>) -> Result<(), QueueError> {
        let mut slot = DEFAULT_SLOT.to_string();

        if let (Some(descriptor), Some(factory)) = (descriptor, self.factory.as_ref()) {
            let requirement = factory.create_requirement(descriptor)?;
            slot = requirement.slot_key();

            let envelope = StoredRequirement::encode(&requirement)?;
            self.store
                .set(&self.requirement_key(&slot), &envelope)
                .await?;
            self.store.set_add(&self.registry_key(), &slot).await?;
        }

        let size = self
            .store
            .list_push(&self.slot_list_key(&slot), job_id, ListPriority::Normal)
            .await?;

        debug!(queue = %self.name, slot = %slot, job = %job_id, size, "job enqueued");
        self.notify(QueueEvent::Enqueue {
            queue: self.name.clone(),
            slot,
            job: job_id.to_string(),
            size,
        })
        .await;

        Ok(())
    }

    /// Dequeue the best job for an offer, or any job when no descriptor or
    /// grammar is given.
    ///
    /// With an offer, all registered requirements are matched against it and
    /// the satisfied ones are tried best-first; a slot found empty along the
    /// way is deregistered on the spot. Returns `None` when nothing matches
    /// or every matching slot is empty.
    ///
    /// # Errors
    ///
    /// Fails with [`QueueError::Format`] on a malformed descriptor, before
    /// any store mutation.
    pub async fn pop(&self, descriptor: Option<&Value>) -> Result<Option<String>, QueueError> {
        let (descriptor, factory) = match (descriptor, self.factory.as_ref()) {
            (Some(descriptor), Some(factory)) => (descriptor, factory),
            _ => return self.pop_default().await,
        };

        let offer = factory.create_offer(descriptor)?;
        let offer_description = offer.describe();
        let mut matcher = factory.create_matcher(offer);

        for slot in self.store.set_members(&self.registry_key()).await? {
            let raw = match self.store.get(&self.requirement_key(&slot)).await? {
                Some(raw) => raw,
                None => {
                    warn!(queue = %self.name, slot = %slot, "registered slot has no stored requirement, skipping");
                    continue;
                }
            };
            match StoredRequirement::decode::<F::Requirement>(&raw) {
                Ok(requirement) => matcher.add_requirement(requirement),
                Err(err) => {
                    warn!(queue = %self.name, slot = %slot, error = %err, "skipping unreadable stored requirement");
                }
            }
        }

        while let Some(best) = matcher.next_best() {
            let slot = best.slot_key();
            match self.store.list_pop(&self.slot_list_key(&slot)).await? {
                Some(job) => {
                    let size = self.store.list_size(&self.slot_list_key(&slot)).await?;
                    debug!(queue = %self.name, slot = %slot, job = %job, size, "job dequeued");
                    self.notify(QueueEvent::Dequeue {
                        queue: self.name.clone(),
                        slot,
                        job: job.clone(),
                        size,
                    })
                    .await;
                    // Even if this pop drained the slot, teardown waits for
                    // the next traversal to observe it empty.
                    return Ok(Some(job));
                }
                None => {
                    self.teardown_slot(&slot).await?;
                }
            }
        }

        debug!(queue = %self.name, "no job matched the offer");
        self.notify(QueueEvent::Miss {
            queue: self.name.clone(),
            slot: None,
            offer: Some(offer_description),
        })
        .await;

        Ok(None)
    }

    /// Read a persisted per-queue configuration parameter.
    pub async fn config_get(&self, param: &str) -> Result<Option<String>, QueueError> {
        Ok(self.load_config().await?.get(param).cloned())
    }

    /// Write a persisted per-queue configuration parameter.
    ///
    /// Writing [`NOTIFY_TARGETS_PARAM`] (a comma-separated `host[:port]`
    /// list) reapplies the target list to the notification sink.
    pub async fn config_set(&self, param: &str, value: &str) -> Result<(), QueueError> {
        let mut config = self.load_config().await?;
        config.insert(param.to_string(), value.to_string());
        self.store
            .set(&self.config_key(), &serde_json::to_string(&config)?)
            .await?;

        if param == NOTIFY_TARGETS_PARAM {
            if let Some(notifier) = &self.notifier {
                let targets = value
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect();
                notifier.set_targets(targets);
            }
        }

        Ok(())
    }

    async fn pop_default(&self) -> Result<Option<String>, QueueError> {
        let list_key = self.slot_list_key(DEFAULT_SLOT);

        let Some(job) = self.store.list_pop(&list_key).await? else {
            debug!(queue = %self.name, slot = DEFAULT_SLOT, "default slot empty");
            self.notify(QueueEvent::Miss {
                queue: self.name.clone(),
                slot: Some(DEFAULT_SLOT.to_string()),
                offer: None,
            })
            .await;
            return Ok(None);
        };

        let size = self.store.list_size(&list_key).await?;
        debug!(queue = %self.name, slot = DEFAULT_SLOT, job = %job, size, "job dequeued");
        self.notify(QueueEvent::Dequeue {
            queue: self.name.clone(),
            slot: DEFAULT_SLOT.to_string(),
            job: job.clone(),
            size,
        })
        .await;

        if size == 0 {
            self.notify(QueueEvent::Empty {
                queue: self.name.clone(),
                slot: DEFAULT_SLOT.to_string(),
            })
            .await;
        }

        Ok(Some(job))
    }

    /// Deregister a slot whose list a `list_pop` just observed empty. A
    /// concurrent push may re-create the entries immediately afterwards;
    /// that leaves a registered slot with zero jobs at worst, which the next
    /// pop repairs.
    async fn teardown_slot(&self, slot: &str) -> Result<(), QueueError> {
        self.store.remove(&self.requirement_key(slot)).await?;
        self.store.set_remove(&self.registry_key(), slot).await?;
        debug!(queue = %self.name, slot = %slot, "drained slot deregistered");
        self.notify(QueueEvent::Empty {
            queue: self.name.clone(),
            slot: slot.to_string(),
        })
        .await;
        Ok(())
    }

    async fn load_config(&self) -> Result<HashMap<String, String>, QueueError> {
        match self.store.get(&self.config_key()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn notify(&self, event: QueueEvent) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(&event).await;
        }
    }

    fn slot_list_key(&self, slot: &str) -> String {
        format!("{}/queue/{}", self.name, slot)
    }

    fn registry_key(&self) -> String {
        format!("{}/feats", self.name)
    }

    fn requirement_key(&self, slot: &str) -> String {
        format!("{}/feats/{}", self.name, slot)
    }

    fn config_key(&self) -> String {
        format!("{}/config", self.name)
    }
}
