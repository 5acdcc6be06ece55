//! Candidate resolution: which record satisfies a requirement.
//!
//! [`CandidateResolver`] is pure selection over a frozen registry; it never
//! constructs anything. The `impl Core` block below turns a selection into a
//! [`ResolvedReference`] by going through the scope manager.
//!
//! Tie-break order for a single candidate:
//! 1. candidates assignable to the required type (minus the requester,
//!    unless it is the only one)
//! 2. qualifier filter, applied before anything else narrows the set
//! 3. none left: absent if optional, otherwise unresolved
//! 4. one left: it wins
//! 5. exactly one primary: it wins; several primaries are an error
//! 6. a candidate named like the slot: it wins
//! 7. otherwise ambiguous

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::container::Core;
use crate::error::{
    AmbiguousDependencyError, AmbiguousPrimaryError, ContainerError, Result, UnresolvedDependencyError,
};
use crate::handle::{DeferredHandle, SupplierHandle};
use crate::key::TypeKey;
use crate::record::{Cardinality, ComponentRecord, Delivery, DependencyRequirement};
use crate::reference::{ResolvedInstance, ResolvedReference};
use crate::registry::Registry;
use crate::scope::Scope;

/// How a dependency is being reached. Only field and lookup requests may
/// receive early references of in-progress singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InjectionStyle {
    Constructor,
    Field,
    Lookup,
}

impl fmt::Display for InjectionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionStyle::Constructor => write!(f, "constructor"),
            InjectionStyle::Field => write!(f, "field"),
            InjectionStyle::Lookup => write!(f, "lookup"),
        }
    }
}

/// Selects records for requirements without constructing them.
pub struct CandidateResolver<'r> {
    registry: &'r Registry,
}

impl<'r> CandidateResolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    fn candidates(&self, requirement: &DependencyRequirement, requester: Option<&str>) -> Vec<Arc<ComponentRecord>> {
        let mut candidates = self.registry.all_eligible_for_type(&requirement.required_type);
        if let Some(requester) = requester
            && candidates.len() > 1
        {
            candidates.retain(|record| record.name() != requester);
        }
        if let Some(filter) = &requirement.qualifier_filter {
            candidates.retain(|record| record.matches_qualifiers(filter));
        }
        candidates
    }

    /// Picks the single record for `requirement`.
    ///
    /// Returns `Ok(None)` only for optional requirements with no candidate.
    pub fn select_one(
        &self,
        requirement: &DependencyRequirement,
        requester: Option<&str>,
    ) -> Result<Option<Arc<ComponentRecord>>> {
        let required_by = requester.map(str::to_string);
        let mut candidates = self.candidates(requirement, requester);
        trace!(
            required = %requirement.required_type,
            candidates = candidates.len(),
            "Selecting candidate"
        );

        if candidates.is_empty() {
            if requirement.is_required() {
                return Err(ContainerError::UnresolvedDependency(UnresolvedDependencyError {
                    required_type: requirement.required_type,
                    qualifiers: requirement.qualifier_filter.clone(),
                    required_by,
                }));
            }
            return Ok(None);
        }
        if candidates.len() == 1 {
            return Ok(candidates.pop());
        }

        let primaries: Vec<&Arc<ComponentRecord>> =
            candidates.iter().filter(|record| record.is_primary()).collect();
        match primaries.as_slice() {
            [only] => return Ok(Some(Arc::clone(only))),
            [] => {}
            several => {
                return Err(ContainerError::AmbiguousPrimary(AmbiguousPrimaryError {
                    required_type: requirement.required_type,
                    primaries: several.iter().map(|r| r.name().to_string()).collect(),
                    required_by,
                }));
            }
        }

        if let Some(hint) = requirement.by_name_hint.as_deref()
            && let Some(named) = candidates.iter().find(|record| record.name() == hint)
        {
            return Ok(Some(named.clone()));
        }

        Err(ContainerError::AmbiguousDependency(AmbiguousDependencyError {
            required_type: requirement.required_type,
            candidates: candidates.iter().map(|r| r.name().to_string()).collect(),
            required_by,
        }))
    }

    /// Every matching record: explicitly ordered ones first by their order,
    /// then the rest in registration order.
    pub fn select_all(
        &self,
        requirement: &DependencyRequirement,
        requester: Option<&str>,
    ) -> Vec<Arc<ComponentRecord>> {
        let mut candidates = self.candidates(requirement, requester);
        candidates.sort_by_key(|record| (record.order_value().is_none(), record.order_value()));
        candidates
    }

    /// Could `requirement` be met right now without an error?
    pub fn is_satisfiable(&self, requirement: &DependencyRequirement, requester: Option<&str>) -> bool {
        if requirement.is_collection() {
            return true;
        }
        match self.select_one(requirement, requester) {
            Ok(Some(_)) => true,
            Ok(None) => !requirement.is_required(),
            Err(_) => false,
        }
    }
}

// ═══════════════════════════════════════════
// Resolution through the container
// ═══════════════════════════════════════════

impl Core {
    /// Resolves `requirement` into a reference honouring delivery,
    /// cardinality and the selected record's scope.
    pub(crate) fn resolve_requirement(
        &self,
        requirement: &DependencyRequirement,
        style: InjectionStyle,
        requester: Option<&str>,
    ) -> Result<ResolvedReference> {
        match requirement.delivery {
            Delivery::Supplier => {
                return Ok(ResolvedReference::Supplier(SupplierHandle::new(
                    self.this.clone(),
                    requirement.clone(),
                    requester,
                )));
            }
            Delivery::Lazy if requirement.is_collection() => {
                let records = {
                    let registry = self.registry.read();
                    CandidateResolver::new(&registry).select_all(requirement, requester)
                };
                return Ok(ResolvedReference::Handles(
                    records
                        .iter()
                        .map(|record| {
                            DeferredHandle::bound(self.this.clone(), requirement.clone(), requester, record.name())
                        })
                        .collect(),
                ));
            }
            Delivery::Lazy => {
                return Ok(ResolvedReference::Deferred(self.deferred_handle(requirement, requester)));
            }
            Delivery::Eager => {}
        }

        match requirement.cardinality {
            Cardinality::All | Cardinality::NamedMap => {
                let records = {
                    let registry = self.registry.read();
                    CandidateResolver::new(&registry).select_all(requirement, requester)
                };
                let mut items = Vec::with_capacity(records.len());
                for record in &records {
                    // Injection never forces a deferred member; lookups do.
                    if style != InjectionStyle::Lookup
                        && record.scope() == Scope::Deferred
                        && self.cache.finished(record.name()).is_none()
                    {
                        trace!(component = record.name(), "Leaving unbuilt deferred component out of collection");
                        continue;
                    }
                    items.push(self.materialize(record, &requirement.required_type, style)?);
                }
                Ok(if requirement.cardinality == Cardinality::All {
                    ResolvedReference::Collection(items)
                } else {
                    ResolvedReference::NamedMap(items)
                })
            }
            Cardinality::One | Cardinality::OptionalOne => {
                let selected = {
                    let registry = self.registry.read();
                    CandidateResolver::new(&registry).select_one(requirement, requester)?
                };
                match selected {
                    None => Ok(ResolvedReference::Absent(requirement.required_type)),
                    Some(record) if record.scope() == Scope::Deferred => {
                        trace!(component = record.name(), "Injecting deferred handle");
                        Ok(ResolvedReference::Deferred(DeferredHandle::bound(
                            self.this.clone(),
                            requirement.clone(),
                            requester,
                            record.name(),
                        )))
                    }
                    Some(record) => Ok(ResolvedReference::Instance(self.materialize(
                        &record,
                        &requirement.required_type,
                        style,
                    )?)),
                }
            }
        }
    }

    /// Selects the single record for `requirement`, treating "none" as an
    /// error even for optional requirements.
    pub(crate) fn select_required(
        &self,
        requirement: &DependencyRequirement,
        requester: Option<&str>,
    ) -> Result<Arc<ComponentRecord>> {
        let registry = self.registry.read();
        CandidateResolver::new(&registry)
            .select_one(requirement, requester)?
            .ok_or_else(|| {
                ContainerError::UnresolvedDependency(UnresolvedDependencyError {
                    required_type: requirement.required_type,
                    qualifiers: requirement.qualifier_filter.clone(),
                    required_by: requester.map(str::to_string),
                })
            })
    }

    /// A deferred handle, bound now if a candidate exists, otherwise kept
    /// pending until a late registration provides one.
    fn deferred_handle(&self, requirement: &DependencyRequirement, requester: Option<&str>) -> DeferredHandle {
        let handle = DeferredHandle::new(self.this.clone(), requirement.clone(), requester);
        let bound = handle.try_bind(&self.registry.read());
        if !bound {
            trace!(required = %requirement.required_type, "Deferred handle pending");
            self.pending.lock().push(handle.clone());
        }
        handle
    }

    /// Gets `record` through its scope and views it as `target`.
    pub(crate) fn materialize(
        &self,
        record: &Arc<ComponentRecord>,
        target: &TypeKey,
        style: InjectionStyle,
    ) -> Result<ResolvedInstance> {
        let instance = self.resolve_for_scope(record, style)?;
        let view = self
            .registry
            .read()
            .cast(&instance, target)
            .ok_or_else(|| ContainerError::TypeMismatch {
                subject: format!("Component {:?}", record.name()),
                expected: target.type_name(),
            })?;
        Ok(ResolvedInstance::new(record.name(), instance, view))
    }

    /// Looks up `name` and materialises it as `target`.
    pub(crate) fn materialize_named(&self, name: &str, target: &TypeKey) -> Result<ResolvedInstance> {
        let record = self.registry.read().lookup(name)?;
        if record.is_abstract_template() {
            return Err(ContainerError::CannotInstantiateTemplate {
                name: name.to_string(),
            });
        }
        self.materialize(&record, target, InjectionStyle::Lookup)
    }
}
