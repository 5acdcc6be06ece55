//! Container settings.
//!
//! Every behavioural knob of the container lives in [`ContainerSettings`].
//! Settings deserialize with serde, so a host can load them from whatever
//! configuration format it already uses; missing keys take their defaults.

use serde::Deserialize;

/// What to do when a long-lived component eagerly depends on a
/// shorter-lived one (e.g. a singleton holding a transient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMismatchPolicy {
    /// Accept silently.
    Ignore,
    /// Accept and log a warning at refresh.
    #[default]
    Warn,
    /// Fail refresh with `ScopeMismatch`.
    Deny,
}

/// Behavioural settings of a container.
///
/// # Examples
/// ```
/// use tessera_container::settings::ContainerSettings;
///
/// let settings = ContainerSettings::default();
/// assert!(!settings.allow_override);
/// assert!(settings.allow_circular_references);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// Allow a registration to replace an existing record with the same name.
    pub allow_override: bool,

    /// Allow field-injected cycles between singletons to be resolved through
    /// early references. When `false`, every cycle fails at refresh.
    pub allow_circular_references: bool,

    /// Policy for long-lived consumers of short-lived dependencies.
    pub scope_mismatch: ScopeMismatchPolicy,

    /// Maximum nesting of constructions on one thread before the build is
    /// treated as a runaway cycle.
    pub max_construction_depth: usize,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_override: false,
            allow_circular_references: true,
            scope_mismatch: ScopeMismatchPolicy::Warn,
            max_construction_depth: 128,
        }
    }
}
