//! Three-tier reference cache for cached-scope components.
//!
//! | tier | holds | lifetime |
//! |---|---|---|
//! | 1 `finished` | fully initialised instances | until close |
//! | 2 `early` | references handed out before init finished | until promotion |
//! | 3 `factories` | thunks that produce the early reference | until first use |
//!
//! A name lives in at most one tier at a time. Promotion to Tier 1 clears
//! the other two.
//!
//! The cache also remembers who was handed what during construction, so a
//! failed construction can evict the components that captured its
//! unfinished instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{ContainerError, Result};
use crate::record::{ComponentRecord, Instance};

/// Produces the early reference of a component that is mid-construction.
pub(crate) type EarlyFactory = Box<dyn FnOnce() -> Result<Instance> + Send>;

/// A component that reached Ready, in the order it got there.
pub(crate) struct ReadyEntry {
    pub name: String,
    /// The instance as constructed, before wrapping. Destroy hooks get this.
    pub raw: Instance,
    pub record: Arc<ComponentRecord>,
}

#[derive(Default)]
pub(crate) struct ReferenceCache {
    finished: DashMap<String, Instance>,
    early: Mutex<HashMap<String, Instance>>,
    factories: Mutex<HashMap<String, EarlyFactory>>,
    ready: Mutex<Vec<ReadyEntry>>,
    /// served name -> (requester, sequence of the latest handoff)
    dependents: Mutex<HashMap<String, Vec<(String, u64)>>>,
    clock: AtomicU64,
}

impl ReferenceCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Tier 1 only.
    pub(crate) fn finished(&self, name: &str) -> Option<Instance> {
        self.finished.get(name).map(|entry| entry.value().clone())
    }

    /// Tier 1, then (if `allow_early`) Tier 2, then Tier 3. A Tier 3 thunk
    /// is run once and its result moved to Tier 2.
    pub(crate) fn get(&self, name: &str, allow_early: bool) -> Result<Option<Instance>> {
        if let Some(ready) = self.finished(name) {
            return Ok(Some(ready));
        }
        if !allow_early {
            return Ok(None);
        }
        if let Some(early) = self.early.lock().get(name) {
            trace!(component = name, "Tier 2 hit");
            return Ok(Some(early.clone()));
        }

        let factory = self.factories.lock().remove(name);
        let Some(factory) = factory else {
            return Ok(None);
        };
        let early = factory()?;
        warn!(
            component = name,
            "Exposing early reference of a component still under construction"
        );
        self.early.lock().insert(name.to_string(), early.clone());
        Ok(Some(early))
    }

    /// Registers the Tier 3 thunk once the raw instance exists.
    pub(crate) fn register_factory(&self, name: &str, factory: EarlyFactory) {
        trace!(component = name, "Tier 3 factory registered");
        self.factories.lock().insert(name.to_string(), factory);
    }

    /// Has an early reference of `name` been handed out?
    pub(crate) fn is_early_exposed(&self, name: &str) -> bool {
        self.early.lock().contains_key(name)
    }

    /// Is `name` in Tier 2 or Tier 3?
    pub(crate) fn is_pending(&self, name: &str) -> bool {
        self.early.lock().contains_key(name) || self.factories.lock().contains_key(name)
    }

    /// Moves `name` to Tier 1 and appends it to the ready list.
    ///
    /// When an early reference exists it stays canonical, provided the
    /// finished instance is either the raw instance or that same reference.
    pub(crate) fn promote(&self, name: &str, finished: &Instance, entry: ReadyEntry) -> Result<Instance> {
        let early = self.early.lock().remove(name);
        self.factories.lock().remove(name);

        let canonical = match early {
            None => finished.clone(),
            Some(early) if Arc::ptr_eq(finished, &entry.raw) || Arc::ptr_eq(finished, &early) => early,
            Some(_) => {
                return Err(ContainerError::EarlyReferenceMismatch {
                    component: name.to_string(),
                });
            }
        };

        self.finished.insert(name.to_string(), canonical.clone());
        self.ready.lock().push(entry);
        trace!(component = name, "Promoted to Tier 1");
        Ok(canonical)
    }

    /// Current handoff sequence number.
    pub(crate) fn tick(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Notes that `requester` was handed an instance of `name`.
    pub(crate) fn record_dependent(&self, name: &str, requester: &str) {
        let seq = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let mut dependents = self.dependents.lock();
        let list = dependents.entry(name.to_string()).or_default();
        match list.iter_mut().find(|(dependent, _)| dependent == requester) {
            Some(existing) => existing.1 = seq,
            None => list.push((requester.to_string(), seq)),
        }
    }

    /// Removes every cached component that received `failed`, directly or
    /// through another component, at or after handoff `since`. Returns the
    /// evicted ready entries, oldest first.
    pub(crate) fn evict_dependents(&self, failed: &str, since: u64) -> Vec<ReadyEntry> {
        let mut tainted: Vec<String> = Vec::new();
        {
            let mut dependents = self.dependents.lock();
            let mut queue = vec![failed.to_string()];
            while let Some(next) = queue.pop() {
                let Some(list) = dependents.get(&next) else {
                    continue;
                };
                for (dependent, seq) in list {
                    if *seq > since && dependent != failed && !tainted.contains(dependent) {
                        tainted.push(dependent.clone());
                        queue.push(dependent.clone());
                    }
                }
            }
            dependents.remove(failed);
        }
        if tainted.is_empty() {
            return Vec::new();
        }

        for name in &tainted {
            self.finished.remove(name);
            self.discard(name);
        }
        let mut ready = self.ready.lock();
        let (evicted, kept): (Vec<ReadyEntry>, Vec<ReadyEntry>) =
            std::mem::take(&mut *ready).into_iter().partition(|entry| tainted.contains(&entry.name));
        *ready = kept;
        evicted
    }

    /// Drops every tier's entry for `name` after a failed construction.
    pub(crate) fn discard(&self, name: &str) {
        self.early.lock().remove(name);
        self.factories.lock().remove(name);
    }

    /// Takes the ready list, oldest first.
    pub(crate) fn drain_ready(&self) -> Vec<ReadyEntry> {
        std::mem::take(&mut *self.ready.lock())
    }

    pub(crate) fn ready_names(&self) -> Vec<String> {
        self.ready.lock().iter().map(|entry| entry.name.clone()).collect()
    }

    pub(crate) fn clear(&self) {
        self.finished.clear();
        self.early.lock().clear();
        self.factories.lock().clear();
        self.ready.lock().clear();
        self.dependents.lock().clear();
    }

    /// Number of finished instances.
    pub(crate) fn len(&self) -> usize {
        self.finished.len()
    }
}

impl fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("finished", &self.finished.len())
            .field("early", &self.early.lock().len())
            .field("factories", &self.factories.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn entry(name: &str, raw: &Instance) -> ReadyEntry {
        ReadyEntry {
            name: name.to_string(),
            raw: raw.clone(),
            record: Arc::new(ComponentRecord::of::<u32>(name)),
        }
    }

    #[test]
    fn promote_without_early_uses_finished() {
        let cache = ReferenceCache::new();
        let raw: Instance = Arc::new(1u32);
        let canonical = cache.promote("a", &raw, entry("a", &raw)).unwrap();
        assert!(Arc::ptr_eq(&canonical, &raw));
        assert!(Arc::ptr_eq(&cache.finished("a").unwrap(), &raw));
        assert_eq!(cache.ready_names(), vec!["a"]);
    }

    #[test]
    fn early_tiers_only_when_allowed() {
        let cache = ReferenceCache::new();
        let raw: Instance = Arc::new(1u32);
        let handed = raw.clone();
        cache.register_factory("a", Box::new(move || Ok(handed)));

        assert!(cache.get("a", false).unwrap().is_none());
        assert!(cache.is_pending("a"));
        assert!(!cache.is_early_exposed("a"));

        let early = cache.get("a", true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&early, &raw));
        assert!(cache.is_early_exposed("a"));
    }

    #[test]
    fn factory_runs_once() {
        let cache = ReferenceCache::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        cache.register_factory(
            "a",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(1u32) as Instance)
            }),
        );
        let first = cache.get("a", true).unwrap().unwrap();
        let second = cache.get("a", true).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn early_wrapped_reference_stays_canonical() {
        let cache = ReferenceCache::new();
        let raw: Instance = Arc::new(1u32);
        let wrapped: Instance = Arc::new("proxy");
        let handed = wrapped.clone();
        cache.register_factory("a", Box::new(move || Ok(handed)));
        cache.get("a", true).unwrap();

        let canonical = cache.promote("a", &raw, entry("a", &raw)).unwrap();
        assert!(Arc::ptr_eq(&canonical, &wrapped));
        assert!(!cache.is_pending("a"));
    }

    #[test]
    fn replaced_after_early_exposure_is_rejected() {
        let cache = ReferenceCache::new();
        let raw: Instance = Arc::new(1u32);
        let handed = raw.clone();
        cache.register_factory("a", Box::new(move || Ok(handed)));
        cache.get("a", true).unwrap();

        let replacement: Instance = Arc::new(2u32);
        let err = cache.promote("a", &replacement, entry("a", &raw)).unwrap_err();
        assert!(matches!(err, ContainerError::EarlyReferenceMismatch { .. }));
    }

    #[test]
    fn eviction_follows_handoffs_made_after_the_failure_began() {
        let cache = ReferenceCache::new();
        let raw: Instance = Arc::new(1u32);
        cache.promote("old", &raw, entry("old", &raw)).unwrap();
        cache.record_dependent("helper", "old");

        let since = cache.tick();
        cache.record_dependent("failed", "b");
        cache.promote("b", &raw, entry("b", &raw)).unwrap();
        cache.record_dependent("b", "c");
        cache.promote("c", &raw, entry("c", &raw)).unwrap();
        cache.record_dependent("helper", "c");

        let evicted: Vec<String> = cache
            .evict_dependents("failed", since)
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(evicted, vec!["b", "c"]);
        assert_eq!(cache.ready_names(), vec!["old"]);
        assert!(cache.finished("b").is_none());
        assert!(cache.finished("old").is_some());
    }

    #[test]
    fn discard_and_clear() {
        let cache = ReferenceCache::new();
        cache.register_factory("a", Box::new(|| Ok(Arc::new(1u32) as Instance)));
        cache.discard("a");
        assert!(!cache.is_pending("a"));

        let raw: Instance = Arc::new(1u32);
        cache.promote("b", &raw, entry("b", &raw)).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.drain_ready().is_empty());
    }
}
