//! # Tessera: an inversion-of-control container for Rust
//!
//! Components are described by [`ComponentRecord`](prelude::ComponentRecord)s:
//! how to construct them, what they need, which scope they live in and
//! which hooks run when they start and stop. The container wires them
//! together, shares singletons, breaks field-injection cycles with early
//! references and destroys everything in reverse order on close.
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera::prelude::*;
//!
//! struct Clock;
//! struct Scheduler {
//!     clock: Arc<Clock>,
//! }
//!
//! let container = Container::builder()
//!     .component(ComponentRecord::of::<Clock>("clock").recipe(ConstructionRecipe::no_args(|| Clock)))
//!     .component(ComponentRecord::of::<Scheduler>("scheduler").recipe(ConstructionRecipe::new(
//!         vec![DependencyRequirement::of::<Clock>()],
//!         |args| Ok(Scheduler { clock: args.instance()? }),
//!     )))
//!     .build()?;
//! container.refresh()?;
//!
//! let scheduler: Arc<Scheduler> = container.resolve()?;
//! let clock: Arc<Clock> = container.resolve_named("clock")?;
//! assert!(Arc::ptr_eq(&scheduler.clock, &clock));
//! # Ok::<(), tessera::ContainerError>(())
//! ```

pub use tessera_container::*;
pub use tessera_support as support;
