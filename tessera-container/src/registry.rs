//! Component registry: stores every record under its unique name.
//!
//! Records are registered while the container is Unstarted, merged with
//! their parent templates by [`Registry::freeze`], and read-only after
//! that (apart from late Deferred registrations).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tessera_support::rendering::suggest_similar;
use tracing::{debug, trace};

use crate::error::{ContainerError, DuplicateNameError, NotFoundError, Result};
use crate::key::TypeKey;
use crate::record::{CastFn, ComponentRecord, Instance, TypeView, runtime_type_id};
use crate::scope::Scope;

/// Maps (runtime type, target type) to the cast producing `Arc<target>`.
#[derive(Default)]
pub(crate) struct ViewTable {
    casts: HashMap<(TypeId, TypeId), CastFn>,
}

impl ViewTable {
    pub(crate) fn insert(&mut self, view: &TypeView) {
        self.casts
            .entry((view.source().type_id(), view.target().type_id()))
            .or_insert_with(|| view.cast_fn());
    }

    pub(crate) fn cast(&self, instance: &Instance, target: &TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        let cast = self.casts.get(&(runtime_type_id(instance), target.type_id()))?;
        cast(instance)
    }

    pub(crate) fn len(&self) -> usize {
        self.casts.len()
    }
}

/// Stores all component records.
pub struct Registry {
    records: HashMap<String, Arc<ComponentRecord>>,
    order: Vec<String>,
    views: ViewTable,
    frozen: bool,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            views: ViewTable::default(),
            frozen: false,
        }
    }

    /// Stores `record` under its name.
    ///
    /// # Errors
    /// - [`ContainerError::DuplicateName`] if the name exists and
    ///   `allow_override` is false
    /// - [`ContainerError::RegistryFrozen`] after [`freeze`](Self::freeze)
    pub fn register(&mut self, record: ComponentRecord, allow_override: bool) -> Result<()> {
        if self.frozen {
            return Err(ContainerError::RegistryFrozen {
                name: record.name().to_string(),
            });
        }
        self.insert(record, allow_override)?;
        Ok(())
    }

    /// Registration after freeze. The record is merged with its (already
    /// effective) parent immediately and must end up Deferred-scoped.
    pub(crate) fn register_late(
        &mut self,
        record: ComponentRecord,
        allow_override: bool,
    ) -> Result<Arc<ComponentRecord>> {
        let merged = match record.parent_template() {
            Some(parent) => {
                let template = self.records.get(parent).ok_or_else(|| {
                    ContainerError::UnresolvedTemplate {
                        component: record.name().to_string(),
                        parent: parent.to_string(),
                        reason: "no record with that name".to_string(),
                    }
                })?;
                record.inherit_from(template)
            }
            None => record,
        };

        if merged.scope() != Scope::Deferred {
            return Err(ContainerError::RegistryFrozen {
                name: merged.name().to_string(),
            });
        }
        for view in merged.views() {
            self.views.insert(view);
        }
        self.insert(merged, allow_override)
    }

    fn insert(&mut self, record: ComponentRecord, allow_override: bool) -> Result<Arc<ComponentRecord>> {
        let name = record.name().to_string();
        if self.records.contains_key(&name) {
            if !allow_override {
                return Err(ContainerError::DuplicateName(DuplicateNameError { name }));
            }
            debug!(component = %name, "Overriding component record");
        } else {
            self.order.push(name.clone());
        }

        debug!(
            component = %name,
            scope = %record.scope(),
            parent = record.parent_template(),
            "Registered component"
        );
        let record = Arc::new(record);
        self.records.insert(name, record.clone());
        Ok(record)
    }

    /// The effective record of `child` inheriting from `parent`, resolving
    /// the parent's own chain first.
    pub fn merge(&self, child: &str, parent: &str) -> Result<ComponentRecord> {
        if self.frozen {
            return Err(ContainerError::RegistryFrozen {
                name: child.to_string(),
            });
        }
        let record = self.lookup(child)?;
        let mut visiting = vec![child.to_string()];
        let template = self.effective(parent, child, &mut visiting)?;
        Ok(record.inherit_from(&template))
    }

    /// Resolves every parent chain and makes the registry read-only.
    pub fn freeze(&mut self) -> Result<()> {
        if self.frozen {
            return Ok(());
        }
        let mut merged = HashMap::with_capacity(self.records.len());
        for name in &self.order {
            let mut visiting = Vec::new();
            let record = self.effective(name, name, &mut visiting)?;
            merged.insert(name.clone(), Arc::new(record));
        }
        for record in merged.values() {
            for view in record.views() {
                self.views.insert(view);
            }
        }
        self.records = merged;
        self.frozen = true;
        debug!(components = self.order.len(), views = self.views.len(), "Registry frozen");
        Ok(())
    }

    fn effective(&self, name: &str, requested_by: &str, visiting: &mut Vec<String>) -> Result<ComponentRecord> {
        let record = self.records.get(name).ok_or_else(|| ContainerError::UnresolvedTemplate {
            component: requested_by.to_string(),
            parent: name.to_string(),
            reason: "no record with that name".to_string(),
        })?;
        let Some(parent) = record.parent_template() else {
            return Ok((**record).clone());
        };

        visiting.push(name.to_string());
        if visiting.iter().any(|seen| seen == parent) {
            visiting.push(parent.to_string());
            return Err(ContainerError::UnresolvedTemplate {
                component: name.to_string(),
                parent: parent.to_string(),
                reason: format!("parent chain is cyclic: {}", visiting.join(" → ")),
            });
        }
        trace!(component = name, parent, "Merging parent template");
        let template = self.effective(parent, name, visiting)?;
        Ok(record.inherit_from(&template))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Looks up a record by name.
    ///
    /// # Errors
    /// [`ContainerError::NotFound`] with up to three similar names.
    pub fn lookup(&self, name: &str) -> Result<Arc<ComponentRecord>> {
        self.records.get(name).cloned().ok_or_else(|| {
            ContainerError::NotFound(NotFoundError {
                name: name.to_string(),
                suggestions: suggest_similar(name, self.order.iter().map(String::as_str), 3),
            })
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Concrete, eligible records assignable to `key`, in registration
    /// order.
    pub fn all_eligible_for_type(&self, key: &TypeKey) -> Vec<Arc<ComponentRecord>> {
        self.records()
            .filter(|record| {
                !record.is_abstract_template()
                    && record.is_eligible_for_resolution()
                    && record.is_assignable_to(key)
            })
            .cloned()
            .collect()
    }

    /// All records in registration order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<ComponentRecord>> {
        self.order.iter().filter_map(|name| self.records.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds views for runtime types that no record declares (proxies).
    pub(crate) fn add_views(&mut self, views: impl IntoIterator<Item = TypeView>) {
        for view in views {
            self.views.insert(&view);
        }
    }

    /// Views `instance` as `Arc<target>`, boxed.
    pub(crate) fn cast(&self, instance: &Instance, target: &TypeKey) -> Option<Box<dyn Any + Send + Sync>> {
        self.views.cast(instance, target)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.order)
            .field("frozen", &self.frozen)
            .finish()
    }
}
