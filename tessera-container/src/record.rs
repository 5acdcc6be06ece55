//! Component metadata records.
//!
//! A [`ComponentRecord`] is the declarative recipe for one named component:
//! how to construct it, which fields to inject, which scope it lives in and
//! which hooks run around its lifetime. Records are plain data; the
//! [`Registry`](crate::registry::Registry) stores them and the container
//! turns them into instances.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use once_cell::sync::OnceCell;
//! use tessera_container::record::{ComponentRecord, ConstructionRecipe, FieldInjection};
//!
//! #[derive(Default)]
//! struct Repo;
//!
//! #[derive(Default)]
//! struct Service {
//!     repo: OnceCell<Arc<Repo>>,
//! }
//!
//! let repo = ComponentRecord::of::<Repo>("repo")
//!     .recipe(ConstructionRecipe::no_args(Repo::default));
//!
//! let service = ComponentRecord::of::<Service>("service")
//!     .recipe(ConstructionRecipe::no_args(Service::default))
//!     .field(FieldInjection::one("repo", |s: &Service, repo: Arc<Repo>| {
//!         let _ = s.repo.set(repo);
//!     }));
//!
//! assert_eq!(service.fields().len(), 1);
//! assert!(!repo.is_abstract_template());
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, Result};
use crate::handle::{ContainerHandle, Lazy, Supplier};
use crate::key::TypeKey;
use crate::lifecycle::{ContainerAware, NameAware};
use crate::reference::{Arguments, ResolvedInstance, ResolvedReference};
use crate::scope::Scope;

/// A type-erased component instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Key/value tags attached to a record and matched by qualifier filters.
pub type Qualifiers = BTreeMap<String, String>;

/// Returns the runtime type of the value behind an [`Instance`].
pub(crate) fn runtime_type_id(instance: &Instance) -> TypeId {
    (**instance).type_id()
}

fn downcast_target<'a, C: Any>(instance: &'a Instance, subject: &str) -> Result<&'a C> {
    instance
        .downcast_ref::<C>()
        .ok_or_else(|| ContainerError::TypeMismatch {
            subject: subject.to_string(),
            expected: type_name::<C>(),
        })
}

// ═══════════════════════════════════════════
// Type views
// ═══════════════════════════════════════════

/// Casts an instance to a boxed `Arc<T>` for some target `T`.
pub type CastFn = Arc<dyn Fn(&Instance) -> Option<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// Declares that instances of runtime type `C` can be viewed as `Arc<T>`.
///
/// Rust has no runtime subtyping, so every type a component can be
/// requested as (usually a `dyn Trait`) is declared as a view. A record is
/// assignable to its declared type and to every view whose source is its
/// declared type.
#[derive(Clone)]
pub struct TypeView {
    source: TypeKey,
    target: TypeKey,
    cast: CastFn,
}

impl TypeView {
    /// The view of `C` as itself.
    pub fn identity<C: Any + Send + Sync>() -> Self {
        Self {
            source: TypeKey::of::<C>(),
            target: TypeKey::of::<C>(),
            cast: Arc::new(|instance: &Instance| {
                instance
                    .clone()
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(concrete) as Box<dyn Any + Send + Sync>)
            }),
        }
    }

    /// A view of `C` as `T`, using `coerce` for the conversion.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use tessera_container::record::TypeView;
    ///
    /// trait Cache: Send + Sync {}
    /// struct MemoryCache;
    /// impl Cache for MemoryCache {}
    ///
    /// let view = TypeView::new(|c: Arc<MemoryCache>| c as Arc<dyn Cache>);
    /// assert!(view.target().type_name().contains("Cache"));
    /// ```
    pub fn new<C, T, F>(coerce: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            source: TypeKey::of::<C>(),
            target: TypeKey::of::<T>(),
            cast: Arc::new(move |instance: &Instance| {
                instance
                    .clone()
                    .downcast::<C>()
                    .ok()
                    .map(|concrete| Box::new(coerce(concrete)) as Box<dyn Any + Send + Sync>)
            }),
        }
    }

    pub fn source(&self) -> TypeKey {
        self.source
    }

    pub fn target(&self) -> TypeKey {
        self.target
    }

    pub(crate) fn cast_fn(&self) -> CastFn {
        self.cast.clone()
    }
}

impl fmt::Debug for TypeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeView({} as {})", self.source, self.target)
    }
}

// ═══════════════════════════════════════════
// Dependency requirements
// ═══════════════════════════════════════════

/// How many candidates a requirement accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// Exactly one candidate.
    #[default]
    One,
    /// At most one candidate; none resolves to absent.
    OptionalOne,
    /// Every candidate, as an ordered sequence.
    All,
    /// Every candidate, keyed by component name.
    NamedMap,
}

/// When the requirement's target is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Constructed (or fetched) while the consumer is being built.
    #[default]
    Eager,
    /// A deferred handle; construction happens on first use.
    Lazy,
    /// A supplier that resolves anew on every call.
    Supplier,
}

/// What a construction slot or injected field needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequirement {
    /// Type the candidate must be assignable to.
    pub required_type: TypeKey,
    /// Qualifiers every candidate must carry.
    pub qualifier_filter: Option<Qualifiers>,
    /// Slot name, used only as the last tie-break.
    pub by_name_hint: Option<String>,
    pub cardinality: Cardinality,
    pub required: bool,
    pub delivery: Delivery,
}

impl DependencyRequirement {
    /// A required, eager requirement for exactly one `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::for_type(TypeKey::of::<T>())
    }

    pub fn for_type(required_type: TypeKey) -> Self {
        Self {
            required_type,
            qualifier_filter: None,
            by_name_hint: None,
            cardinality: Cardinality::One,
            required: true,
            delivery: Delivery::Eager,
        }
    }

    /// Sets the slot name used for name fallback.
    pub fn named(mut self, hint: impl Into<String>) -> Self {
        self.by_name_hint = Some(hint.into());
        self
    }

    /// Adds one qualifier to the filter.
    pub fn qualified(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifier_filter
            .get_or_insert_with(Qualifiers::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replaces the qualifier filter.
    pub fn with_qualifiers(mut self, qualifiers: Qualifiers) -> Self {
        self.qualifier_filter = Some(qualifiers);
        self
    }

    /// Absence of a candidate resolves to absent instead of failing.
    pub fn optional(mut self) -> Self {
        if self.cardinality == Cardinality::One {
            self.cardinality = Cardinality::OptionalOne;
        }
        self.required = false;
        self
    }

    /// Every candidate, ordered.
    pub fn all(mut self) -> Self {
        self.cardinality = Cardinality::All;
        self
    }

    /// Every candidate, keyed by name.
    pub fn named_map(mut self) -> Self {
        self.cardinality = Cardinality::NamedMap;
        self
    }

    /// Deliver a deferred handle instead of an instance.
    pub fn lazy(mut self) -> Self {
        self.delivery = Delivery::Lazy;
        self
    }

    /// Deliver a supplier that resolves on every call.
    pub fn supplier(mut self) -> Self {
        self.delivery = Delivery::Supplier;
        self
    }

    /// Whether zero candidates is an error.
    pub fn is_required(&self) -> bool {
        self.required && self.cardinality != Cardinality::OptionalOne
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.cardinality, Cardinality::All | Cardinality::NamedMap)
    }
}

// ═══════════════════════════════════════════
// Construction recipes
// ═══════════════════════════════════════════

/// Factory invoked with resolved constructor arguments.
pub type FactoryFn = Arc<dyn Fn(&mut Arguments) -> Result<Instance> + Send + Sync>;

/// One way of constructing a component: ordered requirements plus a factory.
///
/// A record with several recipes behaves like a type with several
/// constructors; the container picks one at construction time.
#[derive(Clone)]
pub struct ConstructionRecipe {
    requirements: Vec<DependencyRequirement>,
    factory: FactoryFn,
}

impl ConstructionRecipe {
    /// A recipe whose factory receives the resolved `requirements` in order.
    pub fn new<C, F>(requirements: Vec<DependencyRequirement>, factory: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&mut Arguments) -> Result<C> + Send + Sync + 'static,
    {
        Self {
            requirements,
            factory: Arc::new(move |args: &mut Arguments| Ok(Arc::new(factory(args)?) as Instance)),
        }
    }

    /// A recipe with no requirements.
    pub fn no_args<C, F>(factory: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self::new(Vec::new(), move |_| Ok(factory()))
    }

    /// A recipe that hands out an already built value.
    pub fn value<C: Any + Send + Sync>(value: Arc<C>) -> Self {
        Self {
            requirements: Vec::new(),
            factory: Arc::new(move |_: &mut Arguments| Ok(value.clone() as Instance)),
        }
    }

    /// A recipe whose factory produces a type-erased instance itself.
    pub fn raw<F>(requirements: Vec<DependencyRequirement>, factory: F) -> Self
    where
        F: Fn(&mut Arguments) -> Result<Instance> + Send + Sync + 'static,
    {
        Self {
            requirements,
            factory: Arc::new(factory),
        }
    }

    pub fn requirements(&self) -> &[DependencyRequirement] {
        &self.requirements
    }

    /// Number of requirements.
    pub fn arity(&self) -> usize {
        self.requirements.len()
    }

    pub(crate) fn invoke(&self, args: &mut Arguments) -> Result<Instance> {
        (self.factory)(args)
    }
}

impl fmt::Debug for ConstructionRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructionRecipe")
            .field("requirements", &self.requirements)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Field injections
// ═══════════════════════════════════════════

/// Assigns a resolved reference to a field of an already constructed instance.
pub type SetterFn = Arc<dyn Fn(&Instance, ResolvedReference) -> Result<()> + Send + Sync>;

/// Where an injected field's value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// Resolved through the candidate resolver.
    Requirement(DependencyRequirement),
    /// A literal value fixed at registration.
    Value(Arc<dyn Fn() -> ResolvedReference + Send + Sync>),
}

/// A field populated after construction.
///
/// Injected fields are assigned through `&self`, so components hold them in
/// interior-mutable cells, typically `once_cell::sync::OnceCell`.
#[derive(Clone)]
pub struct FieldInjection {
    field: String,
    source: FieldSource,
    setter: SetterFn,
}

impl FieldInjection {
    /// A field with an explicit requirement and an untyped setter.
    pub fn new<C, F>(field: impl Into<String>, requirement: DependencyRequirement, setter: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C, ResolvedReference) -> Result<()> + Send + Sync + 'static,
    {
        let field = field.into();
        let subject = format!("target of field `{field}`");
        Self {
            field,
            source: FieldSource::Requirement(requirement),
            setter: Arc::new(move |instance: &Instance, reference: ResolvedReference| {
                setter(downcast_target::<C>(instance, &subject)?, reference)
            }),
        }
    }

    /// A required field holding exactly one `T`; the field name is the
    /// name-fallback hint.
    pub fn one<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Arc<T>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone());
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_instance::<T>()?);
            Ok(())
        })
    }

    /// A field that stays unset when no candidate exists.
    pub fn optional<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Option<Arc<T>>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).optional();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_optional::<T>()?);
            Ok(())
        })
    }

    /// A field holding every candidate of `T`, ordered.
    pub fn all<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Vec<Arc<T>>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).all();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_all::<T>()?);
            Ok(())
        })
    }

    /// A field holding every candidate of `T`, keyed by component name.
    pub fn map<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, BTreeMap<String, Arc<T>>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).named_map();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_map::<T>()?);
            Ok(())
        })
    }

    /// A field holding a deferred handle to `T`.
    pub fn lazy<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Lazy<T>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).lazy();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_lazy::<T>()?);
            Ok(())
        })
    }

    /// A field holding a deferred handle per candidate of `T`, ordered.
    /// Nothing is built until a handle is used.
    pub fn lazy_all<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Vec<Lazy<T>>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).all().lazy();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_lazy_all::<T>()?);
            Ok(())
        })
    }

    /// A field holding a supplier of `T`.
    pub fn supplier<C, T, F>(field: impl Into<String>, setter: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&C, Supplier<T>) + Send + Sync + 'static,
    {
        let field = field.into();
        let requirement = DependencyRequirement::of::<T>().named(field.clone()).supplier();
        Self::new(field, requirement, move |target: &C, reference: ResolvedReference| {
            setter(target, reference.into_supplier::<T>()?);
            Ok(())
        })
    }

    /// A field set to a literal value.
    pub fn value<C, V, F>(field: impl Into<String>, value: V, setter: F) -> Self
    where
        C: Any + Send + Sync,
        V: Any + Send + Sync,
        F: Fn(&C, Arc<V>) + Send + Sync + 'static,
    {
        let field = field.into();
        let subject = format!("target of field `{field}`");
        let value = Arc::new(value);
        let literal_name = field.clone();
        Self {
            field,
            source: FieldSource::Value(Arc::new(move || {
                ResolvedReference::Instance(ResolvedInstance::of_value(&literal_name, value.clone()))
            })),
            setter: Arc::new(move |instance: &Instance, reference: ResolvedReference| {
                setter(downcast_target::<C>(instance, &subject)?, reference.into_instance::<V>()?);
                Ok(())
            }),
        }
    }

    /// Adds a qualifier to the field's requirement. No effect on literals.
    pub fn qualified(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let FieldSource::Requirement(requirement) = self.source {
            self.source = FieldSource::Requirement(requirement.qualified(key, value));
        }
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn source(&self) -> &FieldSource {
        &self.source
    }

    /// The requirement, unless the field is a literal.
    pub fn requirement(&self) -> Option<&DependencyRequirement> {
        match &self.source {
            FieldSource::Requirement(requirement) => Some(requirement),
            FieldSource::Value(_) => None,
        }
    }

    pub(crate) fn assign(&self, instance: &Instance, reference: ResolvedReference) -> Result<()> {
        (self.setter)(instance, reference)
    }
}

impl fmt::Debug for FieldInjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FieldInjection");
        debug.field("field", &self.field);
        match &self.source {
            FieldSource::Requirement(requirement) => debug.field("requirement", requirement),
            FieldSource::Value(_) => debug.field("value", &"<literal>"),
        };
        debug.finish()
    }
}

// ═══════════════════════════════════════════
// Lifecycle hooks
// ═══════════════════════════════════════════

pub type HookFn = Arc<dyn Fn(&Instance) -> Result<()> + Send + Sync>;

/// A named init or destroy callback.
#[derive(Clone)]
pub struct LifecycleHook {
    name: String,
    callback: HookFn,
}

impl LifecycleHook {
    pub fn new<C, F>(name: impl Into<String>, callback: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let subject = format!("target of hook `{name}`");
        Self {
            name,
            callback: Arc::new(move |instance: &Instance| {
                callback(downcast_target::<C>(instance, &subject)?)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, instance: &Instance) -> Result<()> {
        (self.callback)(instance)
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LifecycleHook({})", self.name)
    }
}

/// Capability callbacks run before init hooks.
#[derive(Clone)]
pub(crate) enum AwareCallback {
    Name(Arc<dyn Fn(&Instance, &str) -> Result<()> + Send + Sync>),
    Container(Arc<dyn Fn(&Instance, ContainerHandle) -> Result<()> + Send + Sync>),
}

impl AwareCallback {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            AwareCallback::Name(_) => "name-aware",
            AwareCallback::Container(_) => "container-aware",
        }
    }
}

// ═══════════════════════════════════════════
// ComponentRecord
// ═══════════════════════════════════════════

/// Metadata for one named component.
///
/// Fields that can be inherited from a parent template are optional
/// internally; the accessors apply defaults.
#[derive(Clone)]
pub struct ComponentRecord {
    name: String,
    declared_type: Option<TypeKey>,
    views: Vec<TypeView>,
    scope: Option<Scope>,
    recipes: Vec<ConstructionRecipe>,
    fields: Vec<FieldInjection>,
    qualifiers: Qualifiers,
    primary: Option<bool>,
    abstract_template: bool,
    parent_template: Option<String>,
    init_hooks: Vec<LifecycleHook>,
    destroy_hooks: Vec<LifecycleHook>,
    eligible_for_resolution: Option<bool>,
    order: Option<i32>,
    depends_on: Vec<String>,
    aware: Vec<AwareCallback>,
}

impl ComponentRecord {
    /// A record with no declared type. Useful for children that take their
    /// type from a template, or for name-only components.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: None,
            views: Vec::new(),
            scope: None,
            recipes: Vec::new(),
            fields: Vec::new(),
            qualifiers: Qualifiers::new(),
            primary: None,
            abstract_template: false,
            parent_template: None,
            init_hooks: Vec::new(),
            destroy_hooks: Vec::new(),
            eligible_for_resolution: None,
            order: None,
            depends_on: Vec::new(),
            aware: Vec::new(),
        }
    }

    /// A record declaring type `C`.
    pub fn of<C: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self::named(name).declared_as::<C>()
    }

    /// An abstract template: never instantiated, only inherited from.
    pub fn template(name: impl Into<String>) -> Self {
        Self::named(name).abstract_template()
    }

    // ── Builder ──

    /// Declares the concrete type and its identity view.
    pub fn declared_as<C: Any + Send + Sync>(mut self) -> Self {
        self.declared_type = Some(TypeKey::of::<C>());
        self.views.push(TypeView::identity::<C>());
        self
    }

    /// Makes the component requestable as `T`.
    pub fn exposes<C, T, F>(self, coerce: F) -> Self
    where
        C: Any + Send + Sync,
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    {
        self.view(TypeView::new(coerce))
    }

    pub fn view(mut self, view: TypeView) -> Self {
        self.views.push(view);
        self
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn transient(self) -> Self {
        self.in_scope(Scope::Transient)
    }

    pub fn deferred(self) -> Self {
        self.in_scope(Scope::Deferred)
    }

    pub fn recipe(mut self, recipe: ConstructionRecipe) -> Self {
        self.recipes.push(recipe);
        self
    }

    /// Adds a field injection, replacing any earlier one for the same field.
    pub fn field(mut self, injection: FieldInjection) -> Self {
        self.fields.retain(|existing| existing.field != injection.field);
        self.fields.push(injection);
        self
    }

    pub fn qualifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifiers.insert(key.into(), value.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = Some(true);
        self
    }

    pub fn abstract_template(mut self) -> Self {
        self.abstract_template = true;
        self
    }

    /// Inherit unset fields from the record named `parent`.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_template = Some(parent.into());
        self
    }

    pub fn init_hook(mut self, hook: LifecycleHook) -> Self {
        self.init_hooks.push(hook);
        self
    }

    pub fn destroy_hook(mut self, hook: LifecycleHook) -> Self {
        self.destroy_hooks.push(hook);
        self
    }

    /// Shorthand for `init_hook(LifecycleHook::new(name, callback))`.
    pub fn on_init<C, F>(self, name: impl Into<String>, callback: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C) -> Result<()> + Send + Sync + 'static,
    {
        self.init_hook(LifecycleHook::new(name, callback))
    }

    /// Shorthand for `destroy_hook(LifecycleHook::new(name, callback))`.
    pub fn on_destroy<C, F>(self, name: impl Into<String>, callback: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(&C) -> Result<()> + Send + Sync + 'static,
    {
        self.destroy_hook(LifecycleHook::new(name, callback))
    }

    /// Keeps the component out of type-based matching; lookup by name
    /// still works.
    pub fn exclude_from_resolution(mut self) -> Self {
        self.eligible_for_resolution = Some(false);
        self
    }

    /// Position in collections; lower comes first.
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Ensures the named component is ready before this one is built.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.depends_on.contains(&name) {
            self.depends_on.push(name);
        }
        self
    }

    /// Passes the component name to [`NameAware::set_component_name`].
    pub fn name_aware<C: NameAware + Any + Send + Sync>(mut self) -> Self {
        self.aware.push(AwareCallback::Name(Arc::new(|instance: &Instance, name: &str| {
            downcast_target::<C>(instance, name)?.set_component_name(name);
            Ok(())
        })));
        self
    }

    /// Passes a container handle to [`ContainerAware::set_container`].
    pub fn container_aware<C: ContainerAware + Any + Send + Sync>(mut self) -> Self {
        self.aware.push(AwareCallback::Container(Arc::new(
            |instance: &Instance, handle: ContainerHandle| {
                downcast_target::<C>(instance, "container-aware component")?.set_container(handle);
                Ok(())
            },
        )));
        self
    }

    // ── Accessors ──

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> Option<TypeKey> {
        self.declared_type
    }

    pub fn views(&self) -> &[TypeView] {
        &self.views
    }

    /// Scope, defaulting to [`Scope::Singleton`].
    pub fn scope(&self) -> Scope {
        self.scope.unwrap_or_default()
    }

    pub fn recipes(&self) -> &[ConstructionRecipe] {
        &self.recipes
    }

    pub fn fields(&self) -> &[FieldInjection] {
        &self.fields
    }

    pub fn qualifiers(&self) -> &Qualifiers {
        &self.qualifiers
    }

    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }

    pub fn is_abstract_template(&self) -> bool {
        self.abstract_template
    }

    pub fn parent_template(&self) -> Option<&str> {
        self.parent_template.as_deref()
    }

    pub fn init_hooks(&self) -> &[LifecycleHook] {
        &self.init_hooks
    }

    pub fn destroy_hooks(&self) -> &[LifecycleHook] {
        &self.destroy_hooks
    }

    pub fn init_hook_names(&self) -> Vec<&str> {
        self.init_hooks.iter().map(LifecycleHook::name).collect()
    }

    pub fn destroy_hook_names(&self) -> Vec<&str> {
        self.destroy_hooks.iter().map(LifecycleHook::name).collect()
    }

    pub fn is_eligible_for_resolution(&self) -> bool {
        self.eligible_for_resolution.unwrap_or(true)
    }

    pub fn order_value(&self) -> Option<i32> {
        self.order
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub(crate) fn aware_callbacks(&self) -> &[AwareCallback] {
        &self.aware
    }

    /// Every requirement of every recipe and injected field.
    pub fn all_requirements(&self) -> impl Iterator<Item = &DependencyRequirement> {
        self.recipes
            .iter()
            .flat_map(|recipe| recipe.requirements.iter())
            .chain(self.fields.iter().filter_map(FieldInjection::requirement))
    }

    /// True if every key/value of `filter` is present on this record.
    pub fn matches_qualifiers(&self, filter: &Qualifiers) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.qualifiers.get(key) == Some(value))
    }

    /// True if the record can be requested as `target`.
    pub fn is_assignable_to(&self, target: &TypeKey) -> bool {
        let Some(declared) = self.declared_type else {
            return false;
        };
        declared == *target
            || self
                .views
                .iter()
                .any(|view| view.source == declared && view.target == *target)
    }

    /// Produces the effective record of `self` with unset fields filled
    /// from `parent`. The abstract flag is never inherited.
    pub fn inherit_from(&self, parent: &ComponentRecord) -> ComponentRecord {
        let mut fields: Vec<FieldInjection> = parent
            .fields
            .iter()
            .map(|inherited| {
                self.fields
                    .iter()
                    .find(|own| own.field == inherited.field)
                    .unwrap_or(inherited)
                    .clone()
            })
            .collect();
        fields.extend(
            self.fields
                .iter()
                .filter(|own| !parent.fields.iter().any(|p| p.field == own.field))
                .cloned(),
        );

        let mut qualifiers = parent.qualifiers.clone();
        qualifiers.extend(self.qualifiers.clone());

        let mut views = self.views.clone();
        for view in &parent.views {
            if !views
                .iter()
                .any(|own| own.source == view.source && own.target == view.target)
            {
                views.push(view.clone());
            }
        }

        let mut depends_on = parent.depends_on.clone();
        for name in &self.depends_on {
            if !depends_on.contains(name) {
                depends_on.push(name.clone());
            }
        }

        fn own_or<T: Clone>(own: &[T], inherited: &[T]) -> Vec<T> {
            if own.is_empty() { inherited.to_vec() } else { own.to_vec() }
        }

        ComponentRecord {
            name: self.name.clone(),
            declared_type: self.declared_type.or(parent.declared_type),
            views,
            scope: self.scope.or(parent.scope),
            recipes: own_or(&self.recipes, &parent.recipes),
            fields,
            qualifiers,
            primary: self.primary.or(parent.primary),
            abstract_template: self.abstract_template,
            parent_template: None,
            init_hooks: own_or(&self.init_hooks, &parent.init_hooks),
            destroy_hooks: own_or(&self.destroy_hooks, &parent.destroy_hooks),
            eligible_for_resolution: self
                .eligible_for_resolution
                .or(parent.eligible_for_resolution),
            order: self.order.or(parent.order),
            depends_on,
            aware: own_or(&self.aware, &parent.aware),
        }
    }
}

impl fmt::Debug for ComponentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRecord")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("scope", &self.scope())
            .field("recipes", &self.recipes.len())
            .field("fields", &self.fields)
            .field("qualifiers", &self.qualifiers)
            .field("primary", &self.is_primary())
            .field("abstract_template", &self.abstract_template)
            .field("parent_template", &self.parent_template)
            .field("init_hooks", &self.init_hook_names())
            .field("destroy_hooks", &self.destroy_hook_names())
            .finish()
    }
}
