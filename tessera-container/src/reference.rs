//! Resolved references and constructor arguments.
//!
//! Resolution produces a [`ResolvedReference`]; typed code converts it into
//! the Rust shape it asked for (`Arc<T>`, `Option<Arc<T>>`, `Vec<Arc<T>>`,
//! a name map, [`Lazy<T>`] or [`Supplier<T>`]).

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, Result, UnresolvedDependencyError};
use crate::handle::{DeferredHandle, Lazy, Supplier, SupplierHandle};
use crate::key::TypeKey;
use crate::record::Instance;

/// One resolved component, already cast to the requested type.
pub struct ResolvedInstance {
    name: String,
    instance: Instance,
    view: Box<dyn Any + Send + Sync>,
}

impl ResolvedInstance {
    pub(crate) fn new(name: &str, instance: Instance, view: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.to_string(),
            instance,
            view,
        }
    }

    pub(crate) fn of_value<V: Any + Send + Sync>(name: &str, value: Arc<V>) -> Self {
        Self {
            name: name.to_string(),
            view: Box::new(value.clone()),
            instance: value,
        }
    }

    /// Name of the component this instance came from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type-erased canonical instance.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Extracts the typed view.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(self) -> Result<Arc<T>> {
        let ResolvedInstance { name, view, .. } = self;
        view.downcast::<Arc<T>>()
            .map(|typed| *typed)
            .map_err(|_| ContainerError::TypeMismatch {
                subject: format!("component {name:?}"),
                expected: type_name::<T>(),
            })
    }
}

impl fmt::Debug for ResolvedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResolvedInstance({})", self.name)
    }
}

/// What resolving a requirement produced.
#[derive(Debug)]
pub enum ResolvedReference {
    Instance(ResolvedInstance),
    /// Built on first use.
    Deferred(DeferredHandle),
    /// Resolves anew on every call.
    Supplier(SupplierHandle),
    /// An optional requirement had no candidate.
    Absent(TypeKey),
    Collection(Vec<ResolvedInstance>),
    NamedMap(Vec<ResolvedInstance>),
    /// Every candidate of a lazy collection, none of them built yet.
    Handles(Vec<DeferredHandle>),
}

impl ResolvedReference {
    pub fn is_absent(&self) -> bool {
        matches!(self, ResolvedReference::Absent(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            ResolvedReference::Instance(_) => "an instance",
            ResolvedReference::Deferred(_) => "a deferred handle",
            ResolvedReference::Supplier(_) => "a supplier",
            ResolvedReference::Absent(_) => "an absent reference",
            ResolvedReference::Collection(_) => "a collection",
            ResolvedReference::NamedMap(_) => "a name map",
            ResolvedReference::Handles(_) => "a list of deferred handles",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ContainerError {
        ContainerError::TypeMismatch {
            subject: format!("Resolved {}", self.kind()),
            expected,
        }
    }

    /// Exactly one instance. A deferred handle is forced.
    pub fn into_instance<T: ?Sized + Send + Sync + 'static>(self) -> Result<Arc<T>> {
        match self {
            ResolvedReference::Instance(resolved) => resolved.downcast(),
            ResolvedReference::Deferred(handle) => handle.get()?.downcast(),
            ResolvedReference::Absent(required_type) => Err(ContainerError::UnresolvedDependency(
                UnresolvedDependencyError {
                    required_type,
                    qualifiers: None,
                    required_by: None,
                },
            )),
            other => Err(other.mismatch(type_name::<Arc<T>>())),
        }
    }

    pub fn into_optional<T: ?Sized + Send + Sync + 'static>(self) -> Result<Option<Arc<T>>> {
        match self {
            ResolvedReference::Absent(_) => Ok(None),
            other => other.into_instance().map(Some),
        }
    }

    /// Every instance, in resolution order.
    pub fn into_all<T: ?Sized + Send + Sync + 'static>(self) -> Result<Vec<Arc<T>>> {
        match self {
            ResolvedReference::Collection(items) | ResolvedReference::NamedMap(items) => {
                items.into_iter().map(ResolvedInstance::downcast).collect()
            }
            ResolvedReference::Handles(handles) => handles.iter().map(|handle| handle.get()?.downcast()).collect(),
            ResolvedReference::Absent(_) => Ok(Vec::new()),
            ResolvedReference::Instance(resolved) => Ok(vec![resolved.downcast()?]),
            other => Err(other.mismatch(type_name::<Vec<Arc<T>>>())),
        }
    }

    /// Every instance keyed by component name.
    pub fn into_map<T: ?Sized + Send + Sync + 'static>(self) -> Result<BTreeMap<String, Arc<T>>> {
        match self {
            ResolvedReference::Collection(items) | ResolvedReference::NamedMap(items) => items
                .into_iter()
                .map(|resolved| {
                    let name = resolved.name().to_string();
                    resolved.downcast().map(|typed| (name, typed))
                })
                .collect(),
            ResolvedReference::Absent(_) => Ok(BTreeMap::new()),
            other => Err(other.mismatch(type_name::<BTreeMap<String, Arc<T>>>())),
        }
    }

    pub fn into_lazy<T: ?Sized + Send + Sync + 'static>(self) -> Result<Lazy<T>> {
        match self {
            ResolvedReference::Deferred(handle) => Ok(Lazy::deferred(handle)),
            ResolvedReference::Instance(resolved) => Ok(Lazy::ready(resolved.downcast()?)),
            other => Err(other.mismatch(type_name::<Lazy<T>>())),
        }
    }

    /// Every candidate as a [`Lazy`], in resolution order.
    pub fn into_lazy_all<T: ?Sized + Send + Sync + 'static>(self) -> Result<Vec<Lazy<T>>> {
        match self {
            ResolvedReference::Handles(handles) => Ok(handles.into_iter().map(Lazy::deferred).collect()),
            ResolvedReference::Collection(items) | ResolvedReference::NamedMap(items) => items
                .into_iter()
                .map(|resolved| resolved.downcast().map(Lazy::ready))
                .collect(),
            ResolvedReference::Absent(_) => Ok(Vec::new()),
            other => Err(other.mismatch(type_name::<Vec<Lazy<T>>>())),
        }
    }

    pub fn into_supplier<T: ?Sized + Send + Sync + 'static>(self) -> Result<Supplier<T>> {
        match self {
            ResolvedReference::Supplier(handle) => Ok(Supplier::new(handle)),
            other => Err(other.mismatch(type_name::<Supplier<T>>())),
        }
    }
}

/// Resolved constructor arguments, consumed in requirement order.
///
/// ```rust
/// use std::sync::Arc;
/// use tessera_container::record::{ConstructionRecipe, DependencyRequirement};
///
/// struct Pool;
/// struct Repo {
///     pool: Arc<Pool>,
/// }
///
/// let recipe = ConstructionRecipe::new(
///     vec![DependencyRequirement::of::<Pool>()],
///     |args| Ok(Repo { pool: args.instance::<Pool>()? }),
/// );
/// assert_eq!(recipe.arity(), 1);
/// ```
pub struct Arguments {
    component: String,
    values: std::vec::IntoIter<ResolvedReference>,
    total: usize,
}

impl Arguments {
    pub(crate) fn new(component: &str, values: Vec<ResolvedReference>) -> Self {
        Self {
            component: component.to_string(),
            total: values.len(),
            values: values.into_iter(),
        }
    }

    /// Name of the component being constructed.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// The next argument, unconverted.
    pub fn reference(&mut self) -> Result<ResolvedReference> {
        let position = self.total - self.values.len();
        self.values.next().ok_or_else(|| {
            ContainerError::failed(
                self.component.clone(),
                format!("recipe asked for argument #{position} but only {} were declared", self.total),
            )
        })
    }

    pub fn instance<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        self.reference()?.into_instance()
    }

    pub fn optional<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Option<Arc<T>>> {
        self.reference()?.into_optional()
    }

    pub fn all<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Vec<Arc<T>>> {
        self.reference()?.into_all()
    }

    pub fn map<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<BTreeMap<String, Arc<T>>> {
        self.reference()?.into_map()
    }

    pub fn lazy<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Lazy<T>> {
        self.reference()?.into_lazy()
    }

    pub fn lazy_all<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Vec<Lazy<T>>> {
        self.reference()?.into_lazy_all()
    }

    pub fn supplier<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Supplier<T>> {
        self.reference()?.into_supplier()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("component", &self.component)
            .field("total", &self.total)
            .field("remaining", &self.values.len())
            .finish()
    }
}
