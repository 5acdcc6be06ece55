//! Core container implementation for Tessera.

pub mod cache;
pub mod construction;
pub mod container;
pub mod error;
pub mod graph;
pub mod handle;
pub(crate) mod inflight;
pub mod key;
pub mod lifecycle;
pub mod provider;
pub mod record;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod settings;

pub use container::{Container, ContainerBuilder, Phase, Resolver, ResolverExt, prelude};
pub use error::{ContainerError, Result};
pub use key::TypeKey;
pub use scope::Scope;
