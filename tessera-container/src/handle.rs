//! Handles that resolve later: deferred references, suppliers and the
//! container handle given to container-aware components.
//!
//! Every handle holds a `Weak` reference to the container core, so a
//! component that keeps a handle never keeps the container alive. Using a
//! handle after the container has been dropped or closed fails with
//! [`ContainerError::ContainerClosed`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::container::{Core, Resolver};
use crate::error::{ContainerError, Result};
use crate::key::TypeKey;
use crate::record::{DependencyRequirement, Instance};
use crate::reference::{ResolvedInstance, ResolvedReference};
use crate::registry::Registry;
use crate::resolver::{CandidateResolver, InjectionStyle};

fn upgrade(core: &Weak<Core>) -> Result<Arc<Core>> {
    core.upgrade().ok_or(ContainerError::ContainerClosed)
}

// ═══════════════════════════════════════════
// DeferredHandle
// ═══════════════════════════════════════════

/// A reference whose target is constructed on first use.
///
/// The target name is fixed the first time a candidate is found (at
/// creation, at a later registration, or at first use). Each [`get`]
/// goes through the scope manager, so a deferred singleton is built once
/// and then served from the cache.
///
/// [`get`]: DeferredHandle::get
#[derive(Clone)]
pub struct DeferredHandle {
    core: Weak<Core>,
    requirement: DependencyRequirement,
    requester: Option<String>,
    target: Arc<OnceCell<String>>,
}

impl DeferredHandle {
    pub(crate) fn new(core: Weak<Core>, requirement: DependencyRequirement, requester: Option<&str>) -> Self {
        Self {
            core,
            requirement,
            requester: requester.map(str::to_string),
            target: Arc::new(OnceCell::new()),
        }
    }

    pub(crate) fn bound(
        core: Weak<Core>,
        requirement: DependencyRequirement,
        requester: Option<&str>,
        target: &str,
    ) -> Self {
        let handle = Self::new(core, requirement, requester);
        let _ = handle.target.set(target.to_string());
        handle
    }

    /// Binds the target if the registry now has a unique candidate.
    pub(crate) fn try_bind(&self, registry: &Registry) -> bool {
        if self.target.get().is_some() {
            return true;
        }
        match CandidateResolver::new(registry).select_one(&self.requirement, self.requester.as_deref()) {
            Ok(Some(record)) => {
                trace!(component = record.name(), "Deferred handle bound");
                let _ = self.target.set(record.name().to_string());
                true
            }
            _ => false,
        }
    }

    /// Name of the bound target, if one has been chosen yet.
    pub fn target_name(&self) -> Option<&str> {
        self.target.get().map(String::as_str)
    }

    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }

    pub fn requirement(&self) -> &DependencyRequirement {
        &self.requirement
    }

    /// Resolves the target, constructing it if needed.
    pub fn get(&self) -> Result<ResolvedInstance> {
        let core = upgrade(&self.core)?;
        let _gate = core.enter()?;
        let name = match self.target.get() {
            Some(name) => name.clone(),
            None => {
                let record = core.select_required(&self.requirement, self.requester.as_deref())?;
                let _ = self.target.set(record.name().to_string());
                record.name().to_string()
            }
        };
        core.materialize_named(&name, &self.requirement.required_type)
    }
}

impl fmt::Debug for DeferredHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandle")
            .field("required_type", &self.requirement.required_type)
            .field("target", &self.target.get())
            .finish()
    }
}

// ═══════════════════════════════════════════
// SupplierHandle
// ═══════════════════════════════════════════

/// Resolves its requirement anew on every call.
#[derive(Clone)]
pub struct SupplierHandle {
    core: Weak<Core>,
    requirement: DependencyRequirement,
    requester: Option<String>,
}

impl SupplierHandle {
    pub(crate) fn new(core: Weak<Core>, requirement: DependencyRequirement, requester: Option<&str>) -> Self {
        Self {
            core,
            requirement,
            requester: requester.map(str::to_string),
        }
    }

    pub fn requirement(&self) -> &DependencyRequirement {
        &self.requirement
    }

    /// The unique candidate; fails if there is none or the choice is
    /// ambiguous.
    pub fn get(&self) -> Result<ResolvedInstance> {
        let core = upgrade(&self.core)?;
        let _gate = core.enter()?;
        let record = core.select_required(&self.requirement, self.requester.as_deref())?;
        core.materialize(&record, &self.requirement.required_type, InjectionStyle::Lookup)
    }

    /// `None` when no candidate exists. Ambiguity is still an error.
    pub fn get_if_available(&self) -> Result<Option<ResolvedInstance>> {
        match self.get() {
            Ok(resolved) => Ok(Some(resolved)),
            Err(ContainerError::UnresolvedDependency(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `None` when no candidate exists or the choice is ambiguous.
    pub fn get_if_unique(&self) -> Result<Option<ResolvedInstance>> {
        match self.get() {
            Ok(resolved) => Ok(Some(resolved)),
            Err(
                ContainerError::UnresolvedDependency(_)
                | ContainerError::AmbiguousDependency(_)
                | ContainerError::AmbiguousPrimary(_),
            ) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every candidate, in collection order.
    pub fn all(&self) -> Result<Vec<ResolvedInstance>> {
        let core = upgrade(&self.core)?;
        let _gate = core.enter()?;
        let records = {
            let registry = core.registry.read();
            CandidateResolver::new(&registry).select_all(&self.requirement, self.requester.as_deref())
        };
        records
            .iter()
            .map(|record| core.materialize(record, &self.requirement.required_type, InjectionStyle::Lookup))
            .collect()
    }
}

impl fmt::Debug for SupplierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupplierHandle")
            .field("required_type", &self.requirement.required_type)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Typed wrappers
// ═══════════════════════════════════════════

enum LazyState<T: ?Sized> {
    Ready(Arc<T>),
    Deferred(DeferredHandle),
}

/// A typed deferred reference.
///
/// ```rust,ignore
/// struct Reporter {
///     mailer: Lazy<dyn Mailer>,
/// }
///
/// // the mailer is only constructed here
/// reporter.mailer.get()?.send(report);
/// ```
pub struct Lazy<T: ?Sized> {
    state: LazyState<T>,
}

impl<T: ?Sized + Send + Sync + 'static> Lazy<T> {
    pub(crate) fn ready(instance: Arc<T>) -> Self {
        Self {
            state: LazyState::Ready(instance),
        }
    }

    pub(crate) fn deferred(handle: DeferredHandle) -> Self {
        Self {
            state: LazyState::Deferred(handle),
        }
    }

    /// The target, constructing it on first call.
    pub fn get(&self) -> Result<Arc<T>> {
        match &self.state {
            LazyState::Ready(instance) => Ok(instance.clone()),
            LazyState::Deferred(handle) => handle.get()?.downcast(),
        }
    }

    /// Name of the target if already chosen.
    pub fn target_name(&self) -> Option<&str> {
        match &self.state {
            LazyState::Ready(_) => None,
            LazyState::Deferred(handle) => handle.target_name(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.state, LazyState::Deferred(_))
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        let state = match &self.state {
            LazyState::Ready(instance) => LazyState::Ready(instance.clone()),
            LazyState::Deferred(handle) => LazyState::Deferred(handle.clone()),
        };
        Self { state }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            LazyState::Ready(_) => write!(f, "Lazy(ready)"),
            LazyState::Deferred(handle) => write!(f, "Lazy({handle:?})"),
        }
    }
}

/// A typed supplier: every call resolves again.
pub struct Supplier<T: ?Sized> {
    handle: SupplierHandle,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Supplier<T> {
    pub(crate) fn new(handle: SupplierHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Result<Arc<T>> {
        self.handle.get()?.downcast()
    }

    pub fn get_if_available(&self) -> Result<Option<Arc<T>>> {
        self.handle.get_if_available()?.map(ResolvedInstance::downcast).transpose()
    }

    pub fn get_if_unique(&self) -> Result<Option<Arc<T>>> {
        self.handle.get_if_unique()?.map(ResolvedInstance::downcast).transpose()
    }

    pub fn all(&self) -> Result<Vec<Arc<T>>> {
        self.handle
            .all()?
            .into_iter()
            .map(ResolvedInstance::downcast)
            .collect()
    }
}

impl<T: ?Sized> Clone for Supplier<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Supplier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Supplier({:?})", self.handle)
    }
}

// ═══════════════════════════════════════════
// ContainerHandle
// ═══════════════════════════════════════════

/// A non-owning view of the container, handed to
/// [`ContainerAware`](crate::lifecycle::ContainerAware) components.
#[derive(Clone)]
pub struct ContainerHandle {
    core: Weak<Core>,
}

impl ContainerHandle {
    pub(crate) fn new(core: Weak<Core>) -> Self {
        Self { core }
    }

    /// Looks up a component by name.
    pub fn get(&self, name: &str) -> Result<Instance> {
        let core = upgrade(&self.core)?;
        core.get_by_name(name)
    }

    /// True once the container has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.core.upgrade().is_none_or(|core| core.is_closed())
    }
}

impl Resolver for ContainerHandle {
    fn resolve_reference(&self, requirement: &DependencyRequirement) -> Result<ResolvedReference> {
        let core = upgrade(&self.core)?;
        core.lookup_reference(requirement)
    }

    fn resolve_view(&self, name: &str, target: &TypeKey) -> Result<ResolvedInstance> {
        let core = upgrade(&self.core)?;
        let _gate = core.enter()?;
        core.materialize_named(name, target)
    }
}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerHandle(closed: {})", self.is_closed())
    }
}
