//! Static validation of the component graph at refresh.
//!
//! Runs after the registry is frozen and BEFORE any component is built:
//! - every custom scope has a registered handler
//! - no long-lived component eagerly holds a shorter-lived one
//!   (ignored, logged or rejected per [`ScopeMismatchPolicy`])
//! - in strict mode (`allow_circular_references = false`), no eager cycle
//!
//! Edges are found with the candidate resolver. A requirement that cannot
//! be resolved yet produces no edge; construction reports it with full
//! context later. Lazy and supplier requirements, and single requirements
//! on Deferred components, are not eager and never close a cycle.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::error::{ContainerError, CyclicConstructionError, Result, ScopeMismatchError};
use crate::record::{Cardinality, ComponentRecord, Delivery, DependencyRequirement};
use crate::registry::Registry;
use crate::resolver::CandidateResolver;
use crate::scope::Scope;
use crate::settings::ScopeMismatchPolicy;

/// One outgoing edge of a component.
#[derive(Debug, Clone)]
struct Edge {
    target: String,
    /// Whether the target is materialised while the consumer is built.
    eager: bool,
}

#[derive(Debug)]
struct Node {
    scope: Scope,
    edges: Vec<Edge>,
}

/// Validates the component graph of a frozen registry.
///
/// # Algorithm
/// Depth-first search over eager edges with a "visiting" set, as in any
/// cycle check; the current path is kept for error reporting.
pub(crate) struct GraphValidator<'r> {
    registry: &'r Registry,
    policy: ScopeMismatchPolicy,
    strict: bool,
    known_scopes: HashSet<&'static str>,
    nodes: HashMap<String, Node>,
    visiting: HashSet<String>,
    validated: HashSet<String>,
    path: Vec<String>,
}

impl<'r> GraphValidator<'r> {
    pub fn new(
        registry: &'r Registry,
        policy: ScopeMismatchPolicy,
        strict: bool,
        known_scopes: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            registry,
            policy,
            strict,
            known_scopes: known_scopes.into_iter().collect(),
            nodes: HashMap::new(),
            visiting: HashSet::new(),
            validated: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Validates the whole graph.
    ///
    /// # Errors
    /// - [`ContainerError::UnknownScope`]
    /// - [`ContainerError::ScopeMismatch`] (deny policy only)
    /// - [`ContainerError::CyclicConstruction`] (strict mode only)
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&mut self) -> Result<()> {
        self.build_nodes()?;
        debug!(components = self.nodes.len(), strict = self.strict, "Validating component graph");

        self.check_scopes()?;

        if self.strict {
            let names: Vec<String> = self.registry.names().map(str::to_string).collect();
            for name in names {
                if self.nodes.contains_key(&name) {
                    self.visit(&name)?;
                }
            }
        }

        debug!("Component graph validation passed ✓");
        Ok(())
    }

    fn build_nodes(&mut self) -> Result<()> {
        let resolver = CandidateResolver::new(self.registry);
        for record in self.registry.records() {
            if record.is_abstract_template() {
                continue;
            }
            if let Scope::Custom(scope) = record.scope()
                && !self.known_scopes.contains(scope)
            {
                return Err(ContainerError::UnknownScope {
                    component: record.name().to_string(),
                    scope,
                });
            }

            let mut edges = Vec::new();
            for name in record.dependencies() {
                edges.push(Edge {
                    target: name.clone(),
                    eager: true,
                });
            }
            for requirement in Self::graph_requirements(record) {
                edges.extend(Self::edges_for(&resolver, requirement, record.name()));
            }

            self.nodes.insert(
                record.name().to_string(),
                Node {
                    scope: record.scope(),
                    edges,
                },
            );
        }
        Ok(())
    }

    /// Recipe requirements count only when the recipe is unambiguous; the
    /// alternatives of a multi-recipe record are not all used.
    fn graph_requirements(record: &ComponentRecord) -> Vec<&DependencyRequirement> {
        let mut requirements: Vec<&DependencyRequirement> = match record.recipes() {
            [only] => only.requirements().iter().collect(),
            _ => Vec::new(),
        };
        requirements.extend(record.fields().iter().filter_map(|f| f.requirement()));
        requirements
    }

    fn edges_for(resolver: &CandidateResolver<'_>, requirement: &DependencyRequirement, consumer: &str) -> Vec<Edge> {
        let delivered_eagerly = requirement.delivery == Delivery::Eager;
        match requirement.cardinality {
            Cardinality::All | Cardinality::NamedMap => resolver
                .select_all(requirement, Some(consumer))
                .iter()
                .map(|record| Edge {
                    target: record.name().to_string(),
                    eager: delivered_eagerly && record.scope() != Scope::Deferred,
                })
                .collect(),
            Cardinality::One | Cardinality::OptionalOne => match resolver.select_one(requirement, Some(consumer)) {
                Ok(Some(record)) => vec![Edge {
                    target: record.name().to_string(),
                    eager: delivered_eagerly && record.scope() != Scope::Deferred,
                }],
                _ => Vec::new(),
            },
        }
    }

    /// Checks that no component eagerly holds a shorter-lived one.
    ///
    /// Singleton/Deferred > Custom > Transient.
    fn check_scopes(&self) -> Result<()> {
        if self.policy == ScopeMismatchPolicy::Ignore {
            return Ok(());
        }
        for name in self.registry.names() {
            let Some(consumer) = self.nodes.get(name) else {
                continue;
            };
            for edge in consumer.edges.iter().filter(|e| e.eager) {
                let Some(dependency) = self.nodes.get(&edge.target) else {
                    continue;
                };
                if consumer.scope.lifetime_rank() <= dependency.scope.lifetime_rank() {
                    continue;
                }
                warn!(
                    consumer = name,
                    consumer_scope = %consumer.scope,
                    dependency = %edge.target,
                    dependency_scope = %dependency.scope,
                    "Scope mismatch detected"
                );
                if self.policy == ScopeMismatchPolicy::Deny {
                    return Err(ContainerError::ScopeMismatch(ScopeMismatchError {
                        dependency: edge.target.clone(),
                        dependency_scope: dependency.scope,
                        consumer: name.to_string(),
                        consumer_scope: consumer.scope,
                    }));
                }
            }
        }
        Ok(())
    }

    /// DFS from `name` over eager edges.
    fn visit(&mut self, name: &str) -> Result<()> {
        if self.validated.contains(name) {
            return Ok(());
        }

        if self.visiting.contains(name) {
            let start = self.path.iter().position(|n| n == name).unwrap_or(0);
            let mut chain = self.path[start..].to_vec();
            chain.push(name.to_string());
            warn!(cycle = ?chain, "Cyclic construction detected before instantiation");
            return Err(ContainerError::CyclicConstruction(CyclicConstructionError { chain }));
        }

        let targets: Vec<String> = match self.nodes.get(name) {
            Some(node) => node
                .edges
                .iter()
                .filter(|e| e.eager)
                .map(|e| e.target.clone())
                .collect(),
            None => return Ok(()),
        };

        self.visiting.insert(name.to_string());
        self.path.push(name.to_string());
        for target in targets {
            self.visit(&target)?;
        }
        self.path.pop();
        self.visiting.remove(name);
        self.validated.insert(name.to_string());
        Ok(())
    }
}
