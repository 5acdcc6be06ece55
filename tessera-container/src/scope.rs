//! Component lifetime scopes and the scope manager.
//!
//! Scopes determine how long a constructed component lives:
//! - [`Scope::Singleton`]: one instance per container, built at refresh
//! - [`Scope::Deferred`]: one instance per container, built on first use
//! - [`Scope::Transient`]: new instance on every request, never retained
//! - [`Scope::Custom`]: lifetime owned by a registered [`ScopeHandler`]
//!
//! # Lifetime rank
//! Singleton and Deferred outlive any custom scope, which outlives
//! Transient. The graph validator uses [`Scope::lifetime_rank`] to spot a
//! long-lived consumer holding a shorter-lived dependency.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::cache::ReadyEntry;
use crate::container::Core;
use crate::error::{ContainerError, CyclicConstructionError, Result};
use crate::inflight;
use crate::record::{ComponentRecord, Instance};
use crate::resolver::InjectionStyle;

/// Defines the lifetime of a component within the container.
///
/// # Examples
/// ```
/// use tessera_container::scope::Scope;
///
/// assert!(Scope::Singleton.is_cached());
/// assert!(!Scope::Transient.is_cached());
/// assert!(Scope::Singleton.lifetime_rank() > Scope::Custom("request").lifetime_rank());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance shared across the container.
    ///
    /// Built eagerly by `refresh()`, destroyed by `close()` in reverse
    /// construction order.
    #[default]
    Singleton,

    /// New instance on every request.
    ///
    /// Never cached. The container forgets a transient instance as soon as
    /// it has been handed out and never destroys it.
    Transient,

    /// A singleton whose construction is postponed.
    ///
    /// Not built by `refresh()`. Consumers receive a deferred handle that
    /// builds the instance on first use; once built it is cached and
    /// destroyed like a singleton.
    Deferred,

    /// Lifetime delegated to the [`ScopeHandler`] registered under this name.
    Custom(&'static str),
}

impl Scope {
    /// Returns `true` if instances live in the container's reference cache.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Scope::Singleton | Scope::Deferred)
    }

    /// Returns `true` if `refresh()` builds this scope eagerly.
    #[inline]
    pub fn is_eager(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    /// Returns the lifetime rank (higher = longer lifetime).
    #[inline]
    pub fn lifetime_rank(&self) -> u8 {
        match self {
            Scope::Singleton | Scope::Deferred => 2,
            Scope::Custom(_) => 1,
            Scope::Transient => 0,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "Singleton"),
            Scope::Transient => write!(f, "Transient"),
            Scope::Deferred => write!(f, "Deferred"),
            Scope::Custom(name) => write!(f, "Custom({name})"),
        }
    }
}

/// Owns the instances of one custom scope.
///
/// The container calls [`get`](ScopeHandler::get) every time a component of
/// that scope is requested; the handler decides whether to return a stored
/// instance or to call `create`. This is the seam on which request- or
/// session-bound tiers can be layered.
pub trait ScopeHandler: Send + Sync {
    /// Returns the instance for `name`, calling `create` if the scope does
    /// not hold one yet.
    fn get(&self, name: &str, create: &mut dyn FnMut() -> Result<Instance>) -> Result<Instance>;

    /// Removes the instance for `name` from the scope, if present.
    fn remove(&self, name: &str) -> Option<Instance>;
}

/// A map-backed [`ScopeHandler`]: one instance per name until cleared.
///
/// Useful as a unit-of-work scope: call [`clear`](ScopedStore::clear) when the
/// unit ends and the next request builds fresh instances.
#[derive(Default)]
pub struct ScopedStore {
    instances: DashMap<String, Instance>,
}

impl ScopedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every instance held by this scope.
    pub fn clear(&self) {
        debug!(held = self.instances.len(), "Clearing scoped store");
        self.instances.clear();
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl ScopeHandler for ScopedStore {
    fn get(&self, name: &str, create: &mut dyn FnMut() -> Result<Instance>) -> Result<Instance> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }
        // Built outside the shard lock: construction may re-enter this scope.
        let created = create()?;
        Ok(self
            .instances
            .entry(name.to_string())
            .or_insert(created)
            .clone())
    }

    fn remove(&self, name: &str) -> Option<Instance> {
        self.instances.remove(name).map(|(_, instance)| instance)
    }
}

impl fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("held", &self.instances.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Scope manager
// ═══════════════════════════════════════════

impl Core {
    /// Returns an instance of `record` honouring its scope.
    pub(crate) fn resolve_for_scope(
        &self,
        record: &Arc<ComponentRecord>,
        style: InjectionStyle,
    ) -> Result<Instance> {
        let requester = inflight::current(self.id);
        let instance = self.instance_for_scope(record, style)?;
        if let Some(requester) = requester.filter(|requester| requester != record.name()) {
            self.cache.record_dependent(record.name(), &requester);
        }
        Ok(instance)
    }

    fn instance_for_scope(&self, record: &Arc<ComponentRecord>, style: InjectionStyle) -> Result<Instance> {
        match record.scope() {
            Scope::Singleton | Scope::Deferred => self.resolve_cached(record, style),
            Scope::Transient => {
                if inflight::contains(self.id, record.name()) {
                    return Err(self.cycle_error(record.name()));
                }
                trace!(component = record.name(), "Building transient");
                Ok(self.create(record, style)?.finished)
            }
            Scope::Custom(scope_name) => {
                let handler = self
                    .scopes
                    .get(scope_name)
                    .cloned()
                    .ok_or_else(|| ContainerError::UnknownScope {
                        component: record.name().to_string(),
                        scope: scope_name,
                    })?;
                if inflight::contains(self.id, record.name()) {
                    return Err(self.cycle_error(record.name()));
                }
                handler.get(record.name(), &mut || {
                    self.create(record, style).map(|built| built.finished)
                })
            }
        }
    }

    /// Build-once path for singleton and deferred components.
    fn resolve_cached(
        &self,
        record: &Arc<ComponentRecord>,
        style: InjectionStyle,
    ) -> Result<Instance> {
        let name = record.name();
        if let Some(ready) = self.cache.finished(name) {
            return Ok(ready);
        }

        let _creation = self.creation.lock();
        if let Some(ready) = self.cache.finished(name) {
            return Ok(ready);
        }

        if inflight::contains(self.id, name) {
            return self.early_reference(name, style);
        }

        self.ensure_constructible()?;
        let since = self.cache.tick();
        let promoted = self.create(record, style).and_then(|built| {
            self.cache.promote(
                name,
                &built.finished,
                ReadyEntry {
                    name: name.to_string(),
                    raw: built.raw,
                    record: record.clone(),
                },
            )
        });
        match promoted {
            Ok(canonical) => {
                debug!(component = name, scope = %record.scope(), "Component ready");
                Ok(canonical)
            }
            Err(err) => {
                self.cache.discard(name);
                self.evict_dependents(name, since);
                Err(err)
            }
        }
    }

    /// Destroys the cached components that captured an unfinished `failed`.
    fn evict_dependents(&self, failed: &str, since: u64) {
        let evicted = self.cache.evict_dependents(failed, since);
        for entry in evicted.iter().rev() {
            warn!(
                component = %entry.name,
                failed,
                "Evicting component that holds a reference to a failed construction"
            );
            self.destroy(entry);
        }
    }

    /// Serves a component that is still under construction on this thread.
    fn early_reference(&self, name: &str, style: InjectionStyle) -> Result<Instance> {
        if style == InjectionStyle::Constructor || !self.settings.allow_circular_references {
            return Err(self.cycle_error(name));
        }
        match self.cache.get(name, true)? {
            Some(early) => {
                trace!(component = name, "Serving early reference");
                Ok(early)
            }
            None => Err(self.cycle_error(name)),
        }
    }

    pub(crate) fn cycle_error(&self, name: &str) -> ContainerError {
        let chain = inflight::cycle_chain(self.id, name);
        warn!(
            chain = %tessera_support::rendering::render_chain_vertical(&inflight::chain_entries(self.id)),
            "Cyclic construction detected"
        );
        ContainerError::CyclicConstruction(CyclicConstructionError { chain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ranks() {
        assert!(Scope::Singleton.lifetime_rank() > Scope::Custom("unit").lifetime_rank());
        assert!(Scope::Custom("unit").lifetime_rank() > Scope::Transient.lifetime_rank());
        assert_eq!(Scope::Singleton.lifetime_rank(), Scope::Deferred.lifetime_rank());
    }

    #[test]
    fn scope_is_cached() {
        assert!(Scope::Singleton.is_cached());
        assert!(Scope::Deferred.is_cached());
        assert!(!Scope::Transient.is_cached());
        assert!(!Scope::Custom("unit").is_cached());
    }

    #[test]
    fn only_singleton_is_eager() {
        assert!(Scope::Singleton.is_eager());
        assert!(!Scope::Deferred.is_eager());
        assert!(!Scope::Transient.is_eager());
    }

    #[test]
    fn scope_display() {
        assert_eq!(Scope::Singleton.to_string(), "Singleton");
        assert_eq!(Scope::Transient.to_string(), "Transient");
        assert_eq!(Scope::Deferred.to_string(), "Deferred");
        assert_eq!(Scope::Custom("request").to_string(), "Custom(request)");
    }

    #[test]
    fn default_scope_is_singleton() {
        assert_eq!(Scope::default(), Scope::Singleton);
    }

    #[test]
    fn scoped_store_creates_once_until_cleared() {
        let store = ScopedStore::new();
        let mut calls = 0;
        let mut create = || -> Result<Instance> {
            calls += 1;
            Ok(Arc::new(calls) as Instance)
        };

        let first = store.get("unit", &mut create).unwrap();
        let second = store.get("unit", &mut create).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
        let third = store.get("unit", &mut create).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn scoped_store_remove() {
        let store = ScopedStore::new();
        store.get("unit", &mut || Ok(Arc::new(1u8) as Instance)).unwrap();
        assert!(store.remove("unit").is_some());
        assert!(store.remove("unit").is_none());
    }
}
