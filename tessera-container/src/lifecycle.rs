//! Lifecycle orchestration: population, initialization and destruction.
//!
//! Initialization of a freshly constructed instance runs, in order:
//! 1. [`PostProcessor::should_populate`] (any `false` skips step 2)
//! 2. field injection
//! 3. capability callbacks ([`NameAware`], [`ContainerAware`])
//! 4. [`PostProcessor::before_init`]
//! 5. the record's init hooks, in declaration order
//! 6. [`PostProcessor::after_init`]
//! 7. [`PostProcessor::wrap`], unless the early reference already wrapped it
//!
//! Destruction runs [`PostProcessor::before_destroy`] and then the record's
//! destroy hooks. Destroy failures are logged and never stop shutdown.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::cache::{EarlyFactory, ReadyEntry};
use crate::container::Core;
use crate::error::{ContainerError, Result};
use crate::handle::ContainerHandle;
use crate::record::{AwareCallback, ComponentRecord, FieldSource, Instance, TypeView};
use crate::resolver::InjectionStyle;

/// Receives the component name before init hooks run.
pub trait NameAware {
    fn set_component_name(&self, name: &str);
}

/// Receives a handle to the owning container before init hooks run.
pub trait ContainerAware {
    fn set_container(&self, container: ContainerHandle);
}

/// Container-wide hooks around every component's lifecycle.
///
/// All methods have pass-through defaults. Instances produced by
/// [`wrap`](PostProcessor::wrap) usually have a different runtime type
/// than the component; declare the types they can be viewed as through
/// [`views`](PostProcessor::views).
///
/// # Examples
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use tessera_container::error::Result;
/// use tessera_container::lifecycle::PostProcessor;
/// use tessera_container::record::Instance;
///
/// #[derive(Default)]
/// struct CountingProcessor {
///     initialized: AtomicUsize,
/// }
///
/// impl PostProcessor for CountingProcessor {
///     fn after_init(&self, _name: &str, instance: Instance) -> Result<Instance> {
///         self.initialized.fetch_add(1, Ordering::SeqCst);
///         Ok(instance)
///     }
/// }
/// ```
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Return `false` to skip field injection for this instance.
    fn should_populate(&self, _component: &str, _instance: &Instance) -> Result<bool> {
        Ok(true)
    }

    fn before_init(&self, _component: &str, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    /// May return a different instance. Doing so after an early reference
    /// was handed out fails the construction.
    fn after_init(&self, _component: &str, instance: Instance) -> Result<Instance> {
        Ok(instance)
    }

    /// Wraps the instance (for example in a proxy). Called exactly once per
    /// cached component: when its early reference is first requested, or
    /// after `after_init` otherwise.
    fn wrap(&self, _component: &str, instance: Instance) -> Result<Instance> {
        Ok(instance)
    }

    fn before_destroy(&self, _component: &str, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    /// Type views for instances this processor produces.
    fn views(&self) -> Vec<TypeView> {
        Vec::new()
    }
}

fn wrap_all(processors: &[Arc<dyn PostProcessor>], component: &str, mut instance: Instance) -> Result<Instance> {
    for processor in processors {
        instance = processor.wrap(component, instance)?;
    }
    Ok(instance)
}

/// Registered post-processors, in registration order.
#[derive(Default)]
pub(crate) struct Lifecycle {
    processors: RwLock<Vec<Arc<dyn PostProcessor>>>,
}

impl Lifecycle {
    pub(crate) fn add(&self, processor: Arc<dyn PostProcessor>) {
        debug!(processor = processor.name(), "Registered post-processor");
        self.processors.write().push(processor);
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn PostProcessor>> {
        self.processors.read().clone()
    }

    pub(crate) fn views(&self) -> Vec<TypeView> {
        self.processors.read().iter().flat_map(|p| p.views()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub(crate) fn should_populate(&self, component: &str, instance: &Instance) -> Result<bool> {
        for processor in self.snapshot() {
            if !processor.should_populate(component, instance)? {
                trace!(component, processor = processor.name(), "Population skipped");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The Tier 3 thunk: wraps the raw instance when first requested.
    pub(crate) fn early_factory(&self, component: &str, raw: Instance) -> EarlyFactory {
        let processors = self.snapshot();
        let component = component.to_string();
        Box::new(move || wrap_all(&processors, &component, raw))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.processors.read().iter().map(|p| p.name().to_string()).collect();
        f.debug_struct("Lifecycle").field("processors", &names).finish()
    }
}

fn hook_failed(component: &str, hook: impl Into<String>, source: ContainerError) -> ContainerError {
    ContainerError::HookFailed {
        component: component.to_string(),
        hook: hook.into(),
        source: Box::new(source),
    }
}

impl Core {
    /// Injects every declared field into `instance`.
    pub(crate) fn populate(&self, record: &ComponentRecord, instance: &Instance) -> Result<()> {
        let name = record.name();
        for injection in record.fields() {
            let reference = match injection.source() {
                FieldSource::Requirement(requirement) => {
                    self.resolve_requirement(requirement, InjectionStyle::Field, Some(name))?
                }
                FieldSource::Value(literal) => literal(),
            };
            injection
                .assign(instance, reference)
                .map_err(|err| hook_failed(name, format!("field `{}`", injection.field()), err))?;
            trace!(component = name, field = injection.field(), "Field injected");
        }
        Ok(())
    }

    /// Runs the init pipeline and returns the finished instance.
    pub(crate) fn initialize(&self, record: &ComponentRecord, raw: Instance) -> Result<Instance> {
        let name = record.name();
        let processors = self.lifecycle.snapshot();

        for callback in record.aware_callbacks() {
            let outcome = match callback {
                AwareCallback::Name(set) => set(&raw, name),
                AwareCallback::Container(set) => set(&raw, self.handle()),
            };
            outcome.map_err(|err| hook_failed(name, callback.label(), err))?;
        }

        for processor in &processors {
            processor.before_init(name, &raw)?;
        }

        for hook in record.init_hooks() {
            hook.invoke(&raw).map_err(|err| hook_failed(name, hook.name(), err))?;
            trace!(component = name, hook = hook.name(), "Init hook ran");
        }

        let mut instance = raw;
        for processor in &processors {
            instance = processor.after_init(name, instance)?;
        }

        if record.scope().is_cached() && self.cache.is_early_exposed(name) {
            return Ok(instance);
        }
        wrap_all(&processors, name, instance)
    }

    /// Runs destroy callbacks for one ready component.
    pub(crate) fn destroy(&self, entry: &ReadyEntry) {
        let name = entry.name.as_str();
        for processor in self.lifecycle.snapshot() {
            if let Err(err) = processor.before_destroy(name, &entry.raw) {
                error!(component = name, processor = processor.name(), error = %err, "Before-destroy hook failed");
            }
        }
        for hook in entry.record.destroy_hooks() {
            match hook.invoke(&entry.raw) {
                Ok(()) => trace!(component = name, hook = hook.name(), "Destroy hook ran"),
                Err(err) => {
                    error!(component = name, hook = hook.name(), error = %err, "Destroy hook failed");
                }
            }
        }
    }

    /// Destroys every ready component in reverse ready order and empties
    /// the cache.
    pub(crate) fn destroy_singletons(&self) {
        let entries = self.cache.drain_ready();
        debug!(count = entries.len(), "Destroying cached components");
        for entry in entries.iter().rev() {
            self.destroy(entry);
        }
        self.cache.clear();
    }
}
