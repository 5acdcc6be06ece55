//! # The Container
//!
//! Owns the registry, the reference cache, the post-processors and the
//! custom scopes, and drives the container lifecycle.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container (Unstarted)
//!                                   │ refresh()
//!                                   ▼
//!                     freeze registry, validate graph,
//!                     build every Singleton (Refreshing)
//!                                   │
//!                                   ▼
//!                          Active: get / resolve
//!                                   │ close() / drop
//!                                   ▼
//!                     Closed: destroy in reverse order
//! ```
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use tessera_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) -> String { format!("[console] {msg}") }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let container = Container::builder()
//!     .component(
//!         ComponentRecord::of::<ConsoleLogger>("logger")
//!             .exposes(|l: Arc<ConsoleLogger>| l as Arc<dyn Logger>)
//!             .recipe(ConstructionRecipe::no_args(|| ConsoleLogger)),
//!     )
//!     .component(
//!         ComponentRecord::of::<UserService>("userService").recipe(ConstructionRecipe::new(
//!             vec![DependencyRequirement::of::<dyn Logger>()],
//!             |args| Ok(UserService { logger: args.instance()? }),
//!         )),
//!     )
//!     .build()
//!     .expect("Failed to build container");
//!
//! container.refresh().expect("Failed to refresh");
//! let service: Arc<UserService> = container.resolve().expect("Failed to resolve");
//! assert_eq!(service.logger.log("hi"), "[console] hi");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, instrument, trace};

use crate::cache::ReferenceCache;
use crate::error::{ContainerError, Result};
use crate::graph::GraphValidator;
use crate::inflight;
use crate::handle::{ContainerHandle, DeferredHandle, Lazy, Supplier};
use crate::key::TypeKey;
use crate::lifecycle::{Lifecycle, PostProcessor};
use crate::provider::{Provider, ProviderRegistry};
use crate::record::{ComponentRecord, DependencyRequirement, Instance, Qualifiers};
use crate::reference::{ResolvedInstance, ResolvedReference};
use crate::registry::Registry;
use crate::resolver::InjectionStyle;
use crate::scope::ScopeHandler;
use crate::settings::{ContainerSettings, ScopeMismatchPolicy};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle phase of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting registrations; lookups fail with `NotActive`.
    Unstarted,
    /// `refresh()` is building singletons.
    Refreshing,
    /// Serving lookups.
    Active,
    /// Everything destroyed; every operation fails with `ContainerClosed`.
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Unstarted => "unstarted",
            Phase::Refreshing => "refreshing",
            Phase::Active => "active",
            Phase::Closed => "closed",
        };
        f.write_str(label)
    }
}

// ═══════════════════════════════════════════
// Core (shared state)
// ═══════════════════════════════════════════

/// State shared by a [`Container`] and every handle it gives out.
pub(crate) struct Core {
    pub(crate) id: u64,
    pub(crate) this: Weak<Core>,
    pub(crate) settings: ContainerSettings,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) cache: ReferenceCache,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) scopes: HashMap<&'static str, Arc<dyn ScopeHandler>>,
    /// Serialises construction of cached components.
    pub(crate) creation: ReentrantMutex<()>,
    /// Gate: lookups hold it shared, `close` takes it exclusively.
    phase: RwLock<Phase>,
    /// Deferred handles still waiting for a candidate.
    pub(crate) pending: Mutex<Vec<DeferredHandle>>,
}

impl Core {
    fn new(settings: ContainerSettings, scopes: HashMap<&'static str, Arc<dyn ScopeHandler>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Core {
            id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            settings,
            registry: RwLock::new(Registry::new()),
            cache: ReferenceCache::new(),
            lifecycle: Lifecycle::default(),
            scopes,
            creation: ReentrantMutex::new(()),
            phase: RwLock::new(Phase::Unstarted),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Enters the phase gate for a lookup.
    pub(crate) fn enter(&self) -> Result<RwLockReadGuard<'_, Phase>> {
        let phase = self.phase.read_recursive();
        match *phase {
            Phase::Refreshing | Phase::Active => Ok(phase),
            Phase::Unstarted => Err(ContainerError::NotActive),
            Phase::Closed => Err(ContainerError::ContainerClosed),
        }
    }

    /// Fails once the container is closed.
    pub(crate) fn ensure_constructible(&self) -> Result<()> {
        if *self.phase.read_recursive() == Phase::Closed {
            return Err(ContainerError::ContainerClosed);
        }
        Ok(())
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.read_recursive()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    pub(crate) fn handle(&self) -> ContainerHandle {
        ContainerHandle::new(self.this.clone())
    }

    pub(crate) fn get_by_name(&self, name: &str) -> Result<Instance> {
        let _gate = self.enter()?;
        let record = self.registry.read().lookup(name)?;
        if record.is_abstract_template() {
            return Err(ContainerError::CannotInstantiateTemplate {
                name: name.to_string(),
            });
        }
        trace!(component = name, "Lookup by name");
        self.resolve_for_scope(&record, InjectionStyle::Lookup)
    }

    pub(crate) fn lookup_reference(&self, requirement: &DependencyRequirement) -> Result<ResolvedReference> {
        let _gate = self.enter()?;
        self.resolve_requirement(requirement, InjectionStyle::Lookup, None)
    }

    fn register_component(&self, record: ComponentRecord) -> Result<()> {
        let phase = self.phase.read_recursive();
        match *phase {
            Phase::Unstarted => self
                .registry
                .write()
                .register(record, self.settings.allow_override),
            Phase::Refreshing | Phase::Active => {
                let _creation = self.creation.lock();
                let name = record.name();
                if self.cache.finished(name).is_some()
                    || self.cache.is_pending(name)
                    || inflight::contains(self.id, name)
                {
                    return Err(ContainerError::LiveInstance { name: name.to_string() });
                }
                let record = self
                    .registry
                    .write()
                    .register_late(record, self.settings.allow_override)?;
                debug!(component = record.name(), "Late registration of deferred component");
                self.bind_pending();
                Ok(())
            }
            Phase::Closed => Err(ContainerError::ContainerClosed),
        }
    }

    fn add_post_processor(&self, processor: Arc<dyn PostProcessor>) -> Result<()> {
        match self.phase() {
            Phase::Unstarted => {
                self.lifecycle.add(processor);
                Ok(())
            }
            Phase::Refreshing | Phase::Active => Err(ContainerError::AlreadyActive),
            Phase::Closed => Err(ContainerError::ContainerClosed),
        }
    }

    /// Gives pending deferred handles a chance to bind after a late
    /// registration.
    fn bind_pending(&self) {
        let registry = self.registry.read();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|handle| !handle.try_bind(&registry));
        trace!(bound = before - pending.len(), waiting = pending.len(), "Rebound deferred handles");
    }

    #[instrument(skip(self), fields(container = self.id))]
    fn refresh(&self) -> Result<()> {
        {
            let mut phase = self.phase.write();
            match *phase {
                Phase::Unstarted => *phase = Phase::Refreshing,
                Phase::Refreshing | Phase::Active => return Err(ContainerError::AlreadyActive),
                Phase::Closed => return Err(ContainerError::ContainerClosed),
            }
        }
        info!(components = self.registry.read().len(), "Refreshing container");

        match self.refresh_inner() {
            Ok(built) => {
                let mut phase = self.phase.write();
                if *phase == Phase::Refreshing {
                    *phase = Phase::Active;
                }
                info!(singletons = built, "Container active ✓");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Refresh failed, destroying built singletons");
                if let Err(close_err) = self.close() {
                    error!(error = %close_err, "Could not close after failed refresh");
                }
                Err(err)
            }
        }
    }

    fn refresh_inner(&self) -> Result<usize> {
        {
            let mut registry = self.registry.write();
            registry.freeze()?;
            registry.add_views(self.lifecycle.views());
            GraphValidator::new(
                &registry,
                self.settings.scope_mismatch,
                !self.settings.allow_circular_references,
                self.scopes.keys().copied(),
            )
            .validate()?;
        }

        let eager: Vec<Arc<ComponentRecord>> = self
            .registry
            .read()
            .records()
            .filter(|record| !record.is_abstract_template() && record.scope().is_eager())
            .cloned()
            .collect();

        let _gate = self.enter()?;
        for record in &eager {
            self.resolve_for_scope(record, InjectionStyle::Lookup)?;
        }
        Ok(eager.len())
    }

    /// Closes the container. Waits for in-flight lookups, then destroys
    /// every cached component in reverse ready order. Idempotent.
    #[instrument(skip(self), fields(container = self.id))]
    fn close(&self) -> Result<()> {
        // This thread holds the lookup gate while it builds; waiting for
        // the write lock here would never return.
        if let Some(component) = inflight::current(self.id) {
            return Err(ContainerError::CloseDuringConstruction { component });
        }
        {
            let mut phase = self.phase.write();
            if *phase == Phase::Closed {
                return Ok(());
            }
            *phase = Phase::Closed;
        }
        info!("Closing container");
        self.destroy_singletons();
        self.pending.lock().clear();
        info!("Container closed");
        Ok(())
    }
}

// ═══════════════════════════════════════════
// Resolver (typed lookups)
// ═══════════════════════════════════════════

/// Anything components can be looked up from: the [`Container`] itself or
/// a [`ContainerHandle`].
pub trait Resolver: Send + Sync {
    /// Resolves a requirement the way an injection would, but as a lookup.
    fn resolve_reference(&self, requirement: &DependencyRequirement) -> Result<ResolvedReference>;

    /// Looks up `name` and views it as `target`.
    fn resolve_view(&self, name: &str, target: &TypeKey) -> Result<ResolvedInstance>;
}

/// Typed helpers over any [`Resolver`].
///
/// ```rust,ignore
/// let cache: Arc<dyn Cache> = container.resolve_qualified("tier", "fast")?;
/// let handlers: Vec<Arc<dyn Handler>> = container.resolve_all()?;
/// ```
pub trait ResolverExt: Resolver {
    /// The unique component assignable to `T`.
    fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_reference(&DependencyRequirement::of::<T>())?
            .into_instance()
    }

    /// The component called `name`, viewed as `T`.
    fn resolve_named<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve_view(name, &TypeKey::of::<T>())?.downcast()
    }

    /// The unique `T` carrying qualifier `key = value`.
    fn resolve_qualified<T: ?Sized + Send + Sync + 'static>(&self, key: &str, value: &str) -> Result<Arc<T>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().qualified(key, value))?
            .into_instance()
    }

    fn resolve_optional<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().optional())?
            .into_optional()
    }

    /// Every `T`, in collection order.
    fn resolve_all<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().all())?
            .into_all()
    }

    /// Every `T` keyed by component name.
    fn resolve_map<T: ?Sized + Send + Sync + 'static>(&self) -> Result<BTreeMap<String, Arc<T>>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().named_map())?
            .into_map()
    }

    /// A handle that builds `T` on first use.
    fn resolve_lazy<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Lazy<T>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().lazy())?
            .into_lazy()
    }

    /// A supplier resolving `T` on every call.
    fn resolve_supplier<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Supplier<T>> {
        self.resolve_reference(&DependencyRequirement::of::<T>().supplier())?
            .into_supplier()
    }
}

impl<R: Resolver + ?Sized> ResolverExt for R {}

fn into_single(reference: ResolvedReference) -> Result<ResolvedInstance> {
    match reference {
        ResolvedReference::Instance(resolved) => Ok(resolved),
        ResolvedReference::Deferred(handle) => handle.get(),
        other => Err(ContainerError::TypeMismatch {
            subject: format!("Resolved {other:?}"),
            expected: "a single instance",
        }),
    }
}

// ═══════════════════════════════════════════
// ContainerBuilder
// ═══════════════════════════════════════════

/// Builds a [`Container`].
///
/// # Examples
/// ```rust,ignore
/// let container = Container::builder()
///     .allow_circular_references(false)
///     .scope("unit", Arc::new(ScopedStore::new()))
///     .add_provider(&PersistenceProvider)
///     .component(ComponentRecord::of::<Mailer>("mailer").recipe(...))
///     .build()?;
/// container.refresh()?;
/// ```
pub struct ContainerBuilder {
    settings: ContainerSettings,
    components: Vec<ComponentRecord>,
    processors: Vec<Arc<dyn PostProcessor>>,
    scopes: HashMap<&'static str, Arc<dyn ScopeHandler>>,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            settings: ContainerSettings::default(),
            components: Vec::new(),
            processors: Vec::new(),
            scopes: HashMap::new(),
        }
    }

    /// Replaces all settings.
    pub fn settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Allow overriding previously registered components.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.settings.allow_override = allow;
        self
    }

    /// `false` turns on strict mode: cycles fail at refresh.
    pub fn allow_circular_references(mut self, allow: bool) -> Self {
        self.settings.allow_circular_references = allow;
        self
    }

    pub fn scope_mismatch(mut self, policy: ScopeMismatchPolicy) -> Self {
        self.settings.scope_mismatch = policy;
        self
    }

    pub fn max_construction_depth(mut self, depth: usize) -> Self {
        self.settings.max_construction_depth = depth;
        self
    }

    /// Registers a component record.
    pub fn component(mut self, record: ComponentRecord) -> Self {
        self.components.push(record);
        self
    }

    pub fn post_processor(mut self, processor: Arc<dyn PostProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Registers the handler of a custom scope.
    pub fn scope(mut self, name: &'static str, handler: Arc<dyn ScopeHandler>) -> Self {
        self.scopes.insert(name, handler);
        self
    }

    /// Add a [`Provider`] module.
    pub fn add_provider(mut self, provider: &dyn Provider) -> Self {
        debug!(provider = provider.name(), "Adding provider");
        provider.register(&mut self);
        self
    }

    /// Builds an Unstarted container.
    ///
    /// # Errors
    /// [`ContainerError::DuplicateName`] if two records share a name and
    /// overriding is off.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(
            components = self.components.len(),
            post_processors = self.processors.len(),
            "Building container"
        );
        let core = Core::new(self.settings, self.scopes);
        {
            let mut registry = core.registry.write();
            for record in self.components {
                registry.register(record, core.settings.allow_override)?;
            }
        }
        for processor in self.processors {
            core.lifecycle.add(processor);
        }
        Ok(Container { core })
    }
}

impl ProviderRegistry for ContainerBuilder {
    fn register_component(&mut self, record: ComponentRecord) {
        self.components.push(record);
    }

    fn register_post_processor(&mut self, processor: Arc<dyn PostProcessor>) {
        self.processors.push(processor);
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("settings", &self.settings)
            .field("components", &self.components.len())
            .field("post_processors", &self.processors.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe inversion-of-control container.
///
/// Dropping a container closes it.
pub struct Container {
    core: Arc<Core>,
}

impl Container {
    /// Create a new builder.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// An empty container with default settings.
    pub fn new() -> Self {
        Self::with_settings(ContainerSettings::default())
    }

    pub fn with_settings(settings: ContainerSettings) -> Self {
        Self {
            core: Core::new(settings, HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.core.settings
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn is_active(&self) -> bool {
        self.phase() == Phase::Active
    }

    /// Registers a record.
    ///
    /// Before refresh any record is accepted. Afterwards only records that
    /// end up Deferred-scoped are, and pending deferred handles are
    /// re-bound against them.
    ///
    /// # Errors
    /// `DuplicateName`, `RegistryFrozen`, `UnresolvedTemplate` or
    /// `ContainerClosed`.
    pub fn register_component(&self, record: ComponentRecord) -> Result<()> {
        self.core.register_component(record)
    }

    /// Adds a post-processor. Only allowed before refresh.
    pub fn add_post_processor(&self, processor: Arc<dyn PostProcessor>) -> Result<()> {
        self.core.add_post_processor(processor)
    }

    /// Freezes the registry, validates the graph and builds every
    /// singleton in registration order.
    ///
    /// On failure, singletons built so far are destroyed and the container
    /// is left Closed.
    ///
    /// # Errors
    /// `AlreadyActive` on a second call, `ContainerClosed` after close, or
    /// whatever error the first failing construction raised.
    pub fn refresh(&self) -> Result<()> {
        self.core.refresh()
    }

    /// Destroys every cached component in reverse ready order. Waits for
    /// lookups in progress on other threads. Idempotent.
    ///
    /// # Errors
    /// `CloseDuringConstruction` when called from a factory, hook or
    /// post-processor of this container.
    pub fn close(&self) -> Result<()> {
        self.core.close()
    }

    /// The component named `name`, type-erased.
    pub fn get(&self, name: &str) -> Result<Instance> {
        self.core.get_by_name(name)
    }

    /// The unique component assignable to `key` and carrying every
    /// qualifier in `qualifiers`.
    pub fn get_by_type(&self, key: &TypeKey, qualifiers: Option<&Qualifiers>) -> Result<ResolvedInstance> {
        let mut requirement = DependencyRequirement::for_type(*key);
        if let Some(qualifiers) = qualifiers {
            requirement = requirement.with_qualifiers(qualifiers.clone());
        }
        into_single(self.core.lookup_reference(&requirement)?)
    }

    /// Every component assignable to `key`, in collection order.
    pub fn get_all(&self, key: &TypeKey) -> Result<Vec<ResolvedInstance>> {
        match self.core.lookup_reference(&DependencyRequirement::for_type(*key).all())? {
            ResolvedReference::Collection(items) => Ok(items),
            other => Err(ContainerError::TypeMismatch {
                subject: format!("Resolved {other:?}"),
                expected: "a collection",
            }),
        }
    }

    /// Every component assignable to `key`, keyed by name.
    pub fn get_named_map(&self, key: &TypeKey) -> Result<BTreeMap<String, ResolvedInstance>> {
        match self
            .core
            .lookup_reference(&DependencyRequirement::for_type(*key).named_map())?
        {
            ResolvedReference::NamedMap(items) => Ok(items
                .into_iter()
                .map(|resolved| (resolved.name().to_string(), resolved))
                .collect()),
            other => Err(ContainerError::TypeMismatch {
                subject: format!("Resolved {other:?}"),
                expected: "a name map",
            }),
        }
    }

    /// The effective (merged, once refreshed) record of `name`.
    pub fn record(&self, name: &str) -> Result<Arc<ComponentRecord>> {
        self.core.registry.read().lookup(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.core.registry.read().contains(name)
    }

    /// Registered names, in registration order.
    pub fn component_names(&self) -> Vec<String> {
        self.core.registry.read().names().map(str::to_string).collect()
    }

    /// Names of cached components in the order they became ready.
    pub fn ready_components(&self) -> Vec<String> {
        self.core.cache.ready_names()
    }

    /// Is `name` held as an early or pending-early reference right now?
    pub fn is_early_pending(&self, name: &str) -> bool {
        self.core.cache.is_pending(name)
    }

    /// A non-owning handle to this container.
    pub fn handle(&self) -> ContainerHandle {
        self.core.handle()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver for Container {
    fn resolve_reference(&self, requirement: &DependencyRequirement) -> Result<ResolvedReference> {
        self.core.lookup_reference(requirement)
    }

    fn resolve_view(&self, name: &str, target: &TypeKey) -> Result<ResolvedInstance> {
        let _gate = self.core.enter()?;
        self.core.materialize_named(name, target)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(err) = self.core.close() {
            error!(error = %err, "Container dropped without closing");
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("phase", &self.phase())
            .field("registered", &self.core.registry.read().len())
            .field("ready", &self.core.cache.len())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, Phase, Resolver, ResolverExt};
    pub use crate::error::{ContainerError, Result};
    pub use crate::handle::{ContainerHandle, Lazy, Supplier};
    pub use crate::key::TypeKey;
    pub use crate::lifecycle::{ContainerAware, NameAware, PostProcessor};
    pub use crate::provider::{Provider, ProviderRegistry};
    pub use crate::record::{
        ComponentRecord, ConstructionRecipe, DependencyRequirement, FieldInjection, Instance,
        LifecycleHook, Qualifiers, TypeView,
    };
    pub use crate::reference::{Arguments, ResolvedInstance, ResolvedReference};
    pub use crate::scope::{Scope, ScopeHandler, ScopedStore};
    pub use crate::settings::{ContainerSettings, ScopeMismatchPolicy};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ConstructionRecipe;
    use crate::scope::Scope;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug, PartialEq)]
    struct Config {
        url: String,
    }

    struct Repo {
        config: Arc<Config>,
    }

    fn config_record() -> ComponentRecord {
        ComponentRecord::of::<Config>("config").recipe(ConstructionRecipe::no_args(|| Config {
            url: "postgres://localhost".into(),
        }))
    }

    fn counting(name: &str, counter: &Arc<AtomicU32>) -> ComponentRecord {
        let counter = counter.clone();
        ComponentRecord::of::<u32>(name).recipe(ConstructionRecipe::no_args(move || {
            counter.fetch_add(1, Ordering::SeqCst)
        }))
    }

    #[test]
    fn lookup_before_refresh_is_not_active() {
        let container = Container::builder().component(config_record()).build().unwrap();
        assert_eq!(container.phase(), Phase::Unstarted);
        assert!(matches!(container.get("config"), Err(ContainerError::NotActive)));
    }

    #[test]
    fn singleton_built_once_at_refresh() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = Container::builder()
            .component(counting("counter", &counter))
            .build()
            .unwrap();
        container.refresh().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let a = container.get("counter").unwrap();
        let b = container.get("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_built_per_request() {
        let counter = Arc::new(AtomicU32::new(0));
        let container = Container::builder()
            .component(counting("counter", &counter).transient())
            .build()
            .unwrap();
        container.refresh().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        let a: Arc<u32> = container.resolve().unwrap();
        let b: Arc<u32> = container.resolve().unwrap();
        assert_eq!((*a, *b), (0, 1));
        assert!(container.ready_components().is_empty());
    }

    #[test]
    fn constructor_argument_resolution() {
        let container = Container::builder()
            .component(config_record())
            .component(ComponentRecord::of::<Repo>("repo").recipe(ConstructionRecipe::new(
                vec![DependencyRequirement::of::<Config>()],
                |args| Ok(Repo { config: args.instance()? }),
            )))
            .build()
            .unwrap();
        container.refresh().unwrap();

        let repo: Arc<Repo> = container.resolve_named("repo").unwrap();
        assert_eq!(repo.config.url, "postgres://localhost");
        assert_eq!(container.ready_components(), vec!["config", "repo"]);
    }

    #[test]
    fn second_refresh_is_already_active() {
        let container = Container::builder().build().unwrap();
        container.refresh().unwrap();
        assert!(matches!(container.refresh(), Err(ContainerError::AlreadyActive)));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let container = Container::builder().component(config_record()).build().unwrap();
        container.refresh().unwrap();
        container.close().unwrap();
        container.close().unwrap();
        assert_eq!(container.phase(), Phase::Closed);
        assert!(matches!(container.get("config"), Err(ContainerError::ContainerClosed)));
        assert!(matches!(container.refresh(), Err(ContainerError::ContainerClosed)));
        assert!(matches!(
            container.register_component(config_record()),
            Err(ContainerError::ContainerClosed)
        ));
    }

    #[test]
    fn get_unknown_name_suggests() {
        let container = Container::builder().component(config_record()).build().unwrap();
        container.refresh().unwrap();
        match container.get("confg") {
            Err(ContainerError::NotFound(e)) => assert_eq!(e.suggestions, vec!["config"]),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
    }

    #[test]
    fn template_cannot_be_instantiated() {
        let container = Container::builder()
            .component(config_record().abstract_template())
            .build()
            .unwrap();
        container.refresh().unwrap();
        assert!(matches!(
            container.get("config"),
            Err(ContainerError::CannotInstantiateTemplate { .. })
        ));
        assert!(container.ready_components().is_empty());
    }

    #[test]
    fn duplicate_names_fail_build() {
        let result = Container::builder()
            .component(config_record())
            .component(config_record())
            .build();
        assert!(matches!(result, Err(ContainerError::DuplicateName(_))));

        let result = Container::builder()
            .allow_override(true)
            .component(config_record())
            .component(config_record())
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn widest_satisfiable_recipe_wins() {
        struct Report {
            source: &'static str,
        }

        let container = Container::builder()
            .component(config_record())
            .component(
                ComponentRecord::of::<Report>("report")
                    .recipe(ConstructionRecipe::no_args(|| Report { source: "default" }))
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>()],
                        |_| Ok(Report { source: "config" }),
                    ))
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>(), DependencyRequirement::of::<Repo>()],
                        |_| Ok(Report { source: "config+repo" }),
                    )),
            )
            .build()
            .unwrap();
        container.refresh().unwrap();

        let report: Arc<Report> = container.resolve().unwrap();
        assert_eq!(report.source, "config");
    }

    #[test]
    fn tied_recipes_fall_back_to_no_args() {
        struct Report {
            source: &'static str,
        }

        let container = Container::builder()
            .component(config_record())
            .component(
                ComponentRecord::of::<Report>("report")
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>()],
                        |_| Ok(Report { source: "first" }),
                    ))
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>()],
                        |_| Ok(Report { source: "second" }),
                    ))
                    .recipe(ConstructionRecipe::no_args(|| Report { source: "fallback" })),
            )
            .build()
            .unwrap();
        container.refresh().unwrap();
        let report: Arc<Report> = container.resolve().unwrap();
        assert_eq!(report.source, "fallback");
    }

    #[test]
    fn tied_recipes_without_fallback_are_ambiguous() {
        let container = Container::builder()
            .component(config_record())
            .component(
                ComponentRecord::of::<Repo>("repo")
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>()],
                        |args| Ok(Repo { config: args.instance()? }),
                    ))
                    .recipe(ConstructionRecipe::new(
                        vec![DependencyRequirement::of::<Config>().named("config")],
                        |args| Ok(Repo { config: args.instance()? }),
                    )),
            )
            .build()
            .unwrap();
        assert!(matches!(
            container.refresh(),
            Err(ContainerError::AmbiguousConstructionRecipe { .. })
        ));
        assert_eq!(container.phase(), Phase::Closed);
    }

    #[test]
    fn missing_recipe_is_reported() {
        let container = Container::builder()
            .component(ComponentRecord::of::<Config>("config"))
            .build()
            .unwrap();
        assert!(matches!(
            container.refresh(),
            Err(ContainerError::AmbiguousConstructionRecipe { .. })
        ));
    }

    #[test]
    fn depends_on_is_ready_first() {
        let container = Container::builder()
            .component(
                ComponentRecord::of::<u8>("migrations")
                    .depends_on("config")
                    .recipe(ConstructionRecipe::no_args(|| 1u8)),
            )
            .component(config_record())
            .build()
            .unwrap();
        container.refresh().unwrap();
        assert_eq!(container.ready_components(), vec!["config", "migrations"]);
    }

    #[test]
    fn late_override_of_a_live_component_is_refused() {
        let container = Container::builder()
            .allow_override(true)
            .component(config_record().deferred())
            .build()
            .unwrap();
        container.refresh().unwrap();

        container.register_component(config_record().deferred()).unwrap();
        let first = container.get("config").unwrap();
        match container.register_component(config_record().deferred()) {
            Err(ContainerError::LiveInstance { name }) => assert_eq!(name, "config"),
            other => panic!("Expected LiveInstance, got: {other:?}"),
        }
        assert!(Arc::ptr_eq(&first, &container.get("config").unwrap()));
    }

    #[test]
    fn close_from_inside_a_construction_is_refused() {
        use std::sync::atomic::AtomicBool;

        let slot: Arc<once_cell::sync::OnceCell<Container>> = Arc::new(once_cell::sync::OnceCell::new());
        let refused = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(&slot);
        let flag = refused.clone();
        let closer = ComponentRecord::of::<u32>("closer")
            .deferred()
            .recipe(ConstructionRecipe::no_args(move || {
                let outcome = weak.upgrade().and_then(|slot| slot.get().map(Container::close));
                flag.store(
                    matches!(outcome, Some(Err(ContainerError::CloseDuringConstruction { .. }))),
                    Ordering::SeqCst,
                );
                7u32
            }));

        slot.set(Container::builder().component(closer).build().unwrap()).unwrap();
        let container = slot.get().unwrap();
        container.refresh().unwrap();

        assert_eq!(*container.resolve_named::<u32>("closer").unwrap(), 7);
        assert!(refused.load(Ordering::SeqCst));
        assert!(container.is_active());
        container.close().unwrap();
        assert_eq!(container.phase(), Phase::Closed);
    }

    #[test]
    fn post_processor_only_before_refresh() {
        struct Noop;
        impl PostProcessor for Noop {}

        let container = Container::new();
        container.add_post_processor(Arc::new(Noop)).unwrap();
        container.refresh().unwrap();
        assert!(matches!(
            container.add_post_processor(Arc::new(Noop)),
            Err(ContainerError::AlreadyActive)
        ));
    }

    #[test]
    fn unknown_custom_scope_fails_refresh() {
        let container = Container::builder()
            .component(config_record().in_scope(Scope::Custom("request")))
            .build()
            .unwrap();
        assert!(matches!(container.refresh(), Err(ContainerError::UnknownScope { .. })));
    }

    #[test]
    fn handle_outlives_nothing() {
        let container = Container::builder().component(config_record()).build().unwrap();
        container.refresh().unwrap();
        let handle = container.handle();
        assert!(!handle.is_closed());
        assert!(handle.get("config").is_ok());

        drop(container);
        assert!(handle.is_closed());
        assert!(matches!(handle.get("config"), Err(ContainerError::ContainerClosed)));
    }

    #[test]
    fn debug_display() {
        let container = Container::builder().component(config_record()).build().unwrap();
        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("Unstarted"));
    }
}
