//! Provider trait: a module of related component registrations.
//!
//! Providers group the records of one area of an application so the
//! application root adds modules instead of listing every component.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use tessera_container::provider::{Provider, ProviderRegistry};
//! use tessera_container::record::{ComponentRecord, ConstructionRecipe};
//!
//! #[derive(Default)]
//! struct Pool;
//!
//! struct PersistenceProvider;
//!
//! impl Provider for PersistenceProvider {
//!     fn register(&self, registry: &mut dyn ProviderRegistry) {
//!         registry.register_component(
//!             ComponentRecord::of::<Pool>("pool").recipe(ConstructionRecipe::no_args(Pool::default)),
//!         );
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::lifecycle::PostProcessor;
use crate::record::ComponentRecord;

/// A module that registers related components into a container.
///
/// Split registrations by concern:
///
/// ```rust,ignore
/// Container::builder()
///     .add_provider(&PersistenceProvider)
///     .add_provider(&MailProvider)
///     .build()?;
/// ```
pub trait Provider: Send + Sync {
    /// Registers components. Called once, while the container is built.
    fn register(&self, registry: &mut dyn ProviderRegistry);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The part of the builder API a [`Provider`] sees.
///
/// Registration errors (duplicate names) surface from
/// `ContainerBuilder::build`, not here.
pub trait ProviderRegistry {
    fn register_component(&mut self, record: ComponentRecord);

    fn register_post_processor(&mut self, processor: Arc<dyn PostProcessor>);
}
