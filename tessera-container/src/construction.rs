//! Object builder: constructs one instance of a record.
//!
//! Construction picks a recipe, resolves its arguments (constructor-style,
//! so in-progress singletons are never served early), runs the factory,
//! registers the early-reference thunk for cached scopes, then hands the
//! raw instance to the lifecycle pipeline.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::container::Core;
use crate::error::{ContainerError, Result};
use crate::inflight::{self, InFlight};
use crate::record::{ComponentRecord, ConstructionRecipe, Instance};
use crate::reference::Arguments;
use crate::resolver::{CandidateResolver, InjectionStyle};

/// Result of one construction.
pub(crate) struct Built {
    /// The factory's output, before any post-processing.
    pub raw: Instance,
    /// The instance after the init pipeline.
    pub finished: Instance,
}

impl Core {
    pub(crate) fn create(&self, record: &Arc<ComponentRecord>, via: InjectionStyle) -> Result<Built> {
        let name = record.name();
        if record.is_abstract_template() {
            return Err(ContainerError::CannotInstantiateTemplate {
                name: name.to_string(),
            });
        }
        self.ensure_constructible()?;

        let _in_flight = InFlight::enter(
            self.id,
            name,
            record.scope(),
            via,
            self.settings.max_construction_depth,
        )?;
        debug!(
            component = name,
            scope = %record.scope(),
            depth = inflight::depth(self.id),
            "Constructing component"
        );

        for dependency in record.dependencies() {
            trace!(component = name, dependency = %dependency, "Readying depends-on component");
            let target = self.registry.read().lookup(dependency)?;
            self.resolve_for_scope(&target, InjectionStyle::Constructor)?;
        }

        let recipe = self.select_recipe(record)?;
        let mut values = Vec::with_capacity(recipe.arity());
        for requirement in recipe.requirements() {
            values.push(self.resolve_requirement(requirement, InjectionStyle::Constructor, Some(name))?);
        }
        let raw = recipe.invoke(&mut Arguments::new(name, values))?;
        trace!(component = name, "Raw instance created");

        if record.scope().is_cached() && self.settings.allow_circular_references {
            self.cache
                .register_factory(name, self.lifecycle.early_factory(name, raw.clone()));
        }

        if self.lifecycle.should_populate(name, &raw)? {
            self.populate(record, &raw)?;
        }
        let finished = self.initialize(record, raw.clone())?;
        Ok(Built { raw, finished })
    }

    /// Chooses among a record's recipes.
    ///
    /// One recipe is always used. With several, the satisfiable recipe with
    /// the most requirements wins if it is unique; otherwise a
    /// no-requirement recipe is the fallback.
    fn select_recipe<'r>(&self, record: &'r ComponentRecord) -> Result<&'r ConstructionRecipe> {
        let recipes = record.recipes();
        match recipes {
            [] => Err(ContainerError::AmbiguousConstructionRecipe {
                component: record.name().to_string(),
                reason: "no construction recipe is declared".to_string(),
            }),
            [only] => Ok(only),
            _ => {
                let satisfiable: Vec<&ConstructionRecipe> = {
                    let registry = self.registry.read();
                    let resolver = CandidateResolver::new(&registry);
                    recipes
                        .iter()
                        .filter(|recipe| {
                            recipe
                                .requirements()
                                .iter()
                                .all(|requirement| resolver.is_satisfiable(requirement, Some(record.name())))
                        })
                        .collect()
                };

                if let Some(most) = satisfiable.iter().map(|recipe| recipe.arity()).max() {
                    let widest: Vec<&ConstructionRecipe> = satisfiable
                        .iter()
                        .copied()
                        .filter(|recipe| recipe.arity() == most)
                        .collect();
                    if let [unique] = widest.as_slice() {
                        trace!(component = record.name(), arity = most, "Recipe selected");
                        return Ok(*unique);
                    }
                }

                recipes.iter().find(|recipe| recipe.arity() == 0).ok_or_else(|| {
                    ContainerError::AmbiguousConstructionRecipe {
                        component: record.name().to_string(),
                        reason: format!(
                            "{} recipes declared, {} satisfiable, no unique widest one and no zero-argument fallback",
                            recipes.len(),
                            satisfiable.len()
                        ),
                    }
                })
            }
        }
    }
}
