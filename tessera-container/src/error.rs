//! Error types for container operations.
//!
//! Every failure names the component involved and, where it helps, the
//! candidates or chain that led to it plus a hint on how to fix it.

use std::fmt;

use tessera_support::rendering::render_chain;

use crate::key::TypeKey;
use crate::record::Qualifiers;
use crate::scope::Scope;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// A record with the same name is already registered.
    #[error("{}", .0)]
    DuplicateName(DuplicateNameError),

    /// No record is registered under the requested name.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// Abstract templates only seed other records.
    #[error(
        "Component {name:?} is an abstract template and cannot be instantiated\n  Hint: Reference it as a parent template from a concrete record"
    )]
    CannotInstantiateTemplate { name: String },

    /// A required dependency has no candidate.
    #[error("{}", .0)]
    UnresolvedDependency(UnresolvedDependencyError),

    /// Several candidates remain after qualifier, primary and name matching.
    #[error("{}", .0)]
    AmbiguousDependency(AmbiguousDependencyError),

    /// More than one candidate is marked primary.
    #[error("{}", .0)]
    AmbiguousPrimary(AmbiguousPrimaryError),

    /// A component was requested again while it was still being built.
    #[error("{}", .0)]
    CyclicConstruction(CyclicConstructionError),

    /// None of a record's construction recipes can be chosen.
    #[error("Cannot choose a construction recipe for {component:?}: {reason}")]
    AmbiguousConstructionRecipe { component: String, reason: String },

    /// The container has been closed.
    #[error("Container is closed; no new components can be constructed")]
    ContainerClosed,

    /// A late registration tried to replace a component that already has
    /// an instance.
    #[error(
        "Component {name:?} already has a live instance and cannot be overridden\n  Hint: Register the replacement before refresh()"
    )]
    LiveInstance { name: String },

    /// `close()` was called from code running inside a construction.
    #[error(
        "close() called while {component:?} is under construction on this thread\n  Hint: Close the container from outside factories, hooks and post-processors"
    )]
    CloseDuringConstruction { component: String },

    /// `refresh()` was called on a container that is already active.
    #[error("Container is already active. refresh() may only be called once")]
    AlreadyActive,

    /// A lookup was attempted before `refresh()`.
    #[error("Container is not active. Call .refresh() before looking up components")]
    NotActive,

    /// Registration after refresh is only allowed for deferred components.
    #[error(
        "Cannot register {name:?}: the registry is frozen\n  Hint: Only Deferred-scope components can be registered after refresh()"
    )]
    RegistryFrozen { name: String },

    /// A record's parent template cannot be merged.
    #[error("Component {component:?} cannot inherit from template {parent:?}: {reason}")]
    UnresolvedTemplate {
        component: String,
        parent: String,
        reason: String,
    },

    /// An instance cannot be viewed as the requested Rust type.
    #[error(
        "{subject} cannot be viewed as {expected}\n  Hint: Declare the type on the record or expose it with .exposes(...)"
    )]
    TypeMismatch {
        subject: String,
        expected: &'static str,
    },

    /// A factory returned an error.
    #[error("Failed to construct {component:?}: {source}")]
    ConstructionFailed {
        component: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A lifecycle hook or setter returned an error.
    #[error("Hook {hook:?} of component {component:?} failed: {source}")]
    HookFailed {
        component: String,
        hook: String,
        #[source]
        source: Box<ContainerError>,
    },

    /// A post-init hook replaced an instance whose early reference had
    /// already been injected elsewhere.
    #[error(
        "Component {component:?} was injected into other components in its raw form, but was replaced by a post-init hook\n  Hint: Wrap instances in PostProcessor::wrap so early and final references agree"
    )]
    EarlyReferenceMismatch { component: String },

    /// A long-lived component eagerly depends on a shorter-lived one.
    #[error("{}", .0)]
    ScopeMismatch(ScopeMismatchError),

    /// A record uses a custom scope with no registered handler.
    #[error(
        "Component {component:?} uses scope {scope:?} but no handler is registered for it\n  Hint: Register one with ContainerBuilder::scope({scope:?}, handler)"
    )]
    UnknownScope {
        component: String,
        scope: &'static str,
    },
}

impl ContainerError {
    /// Wraps an arbitrary error raised while constructing `component`.
    pub fn failed(
        component: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ContainerError::ConstructionFailed {
            component: component.into(),
            source: source.into(),
        }
    }
}

/// Error when a name is registered twice.
#[derive(Debug)]
pub struct DuplicateNameError {
    pub name: String,
}

impl fmt::Display for DuplicateNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component already registered: {:?}", self.name)?;
        write!(
            f,
            "\n  Hint: Pick a different name, or enable allow_override in ContainerSettings"
        )
    }
}

/// Error when no record carries the requested name.
#[derive(Debug)]
pub struct NotFoundError {
    pub name: String,
    /// Registered names close to the requested one
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component not found: {:?}", self.name)?;
        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }
        Ok(())
    }
}

fn write_qualifiers(f: &mut fmt::Formatter<'_>, qualifiers: &Option<Qualifiers>) -> fmt::Result {
    if let Some(filter) = qualifiers {
        let pairs: Vec<String> = filter.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, " with qualifiers {{{}}}", pairs.join(", "))?;
    }
    Ok(())
}

fn write_required_by(f: &mut fmt::Formatter<'_>, required_by: &Option<String>) -> fmt::Result {
    if let Some(parent) = required_by {
        write!(f, "\n  Required by: {parent}")?;
    }
    Ok(())
}

/// Error when a required dependency has no candidate.
#[derive(Debug)]
pub struct UnresolvedDependencyError {
    pub required_type: TypeKey,
    pub qualifiers: Option<Qualifiers>,
    /// The component whose construction needed it (if any)
    pub required_by: Option<String>,
}

impl fmt::Display for UnresolvedDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unresolved dependency: no component of type {}", self.required_type)?;
        write_qualifiers(f, &self.qualifiers)?;
        write_required_by(f, &self.required_by)?;
        write!(
            f,
            "\n  Hint: Register a component exposing {}, or mark the requirement optional",
            self.required_type
        )
    }
}

/// Error when several candidates remain and nothing breaks the tie.
#[derive(Debug)]
pub struct AmbiguousDependencyError {
    pub required_type: TypeKey,
    pub candidates: Vec<String>,
    pub required_by: Option<String>,
}

impl fmt::Display for AmbiguousDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ambiguous dependency: {} components of type {} match: {}",
            self.candidates.len(),
            self.required_type,
            self.candidates.join(", ")
        )?;
        write_required_by(f, &self.required_by)?;
        write!(
            f,
            "\n  Hint: Add a qualifier, mark one candidate primary, or name the slot after one candidate"
        )
    }
}

/// Error when more than one candidate is marked primary.
#[derive(Debug)]
pub struct AmbiguousPrimaryError {
    pub required_type: TypeKey,
    pub primaries: Vec<String>,
    pub required_by: Option<String>,
}

impl fmt::Display for AmbiguousPrimaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "More than one primary component of type {}: {}",
            self.required_type,
            self.primaries.join(", ")
        )?;
        write_required_by(f, &self.required_by)?;
        write!(f, "\n  Hint: At most one candidate per type may be primary")
    }
}

/// Error when a component is requested while it is still being built.
///
/// Shows the construction chain so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CyclicConstructionError {
    /// Component names forming the cycle, first and last equal.
    /// Example: ["a", "b", "a"]
    pub chain: Vec<String>,
}

impl fmt::Display for CyclicConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cyclic construction detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: Break the cycle with field injection between singletons, or a lazy requirement"
        )
    }
}

/// Error when scope rules are violated under the deny policy.
///
/// A singleton that eagerly holds a transient keeps a stale instance.
#[derive(Debug)]
pub struct ScopeMismatchError {
    pub dependency: String,
    pub dependency_scope: Scope,
    pub consumer: String,
    pub consumer_scope: Scope,
}

impl fmt::Display for ScopeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scope mismatch: {} ({}) eagerly depends on {} ({})",
            self.consumer, self.consumer_scope, self.dependency, self.dependency_scope,
        )?;
        write!(
            f,
            "\n  Hint: Inject {} lazily or through a Supplier so each use resolves it anew",
            self.dependency,
        )
    }
}

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
