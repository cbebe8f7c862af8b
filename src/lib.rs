//! # persona-core
//!
//! Role composition engine. A role is a DPML document whose sections
//! reference other resources (`@thought://analysis`, `@!execution://review`,
//! `@project://docs/finance.md`). Activating a role resolves those references
//! through pluggable protocol resolvers, inlines their content depth first
//! with a cycle guard, and primes a concept graph over the result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use persona_core::activation::RoleActivator;
//! use persona_core::protocol::DirectoryProtocol;
//! use persona_core::registry::{DirectoryScanner, ResourceRegistry};
//! use persona_core::resource::ResourceManager;
//! use persona_core::storage::{MemoryStore, ResourceStore};
//!
//! # async fn run() -> persona_core::error::PersonaResult<()> {
//! let store: Arc<dyn ResourceStore> = Arc::new(
//!     MemoryStore::new()
//!         .with_file("resource/dev.role.md", "<role><principle>@execution://review</principle></role>")
//!         .with_file("resource/review.execution.md", "<execution><process>1. Read\n2. Comment</process></execution>"),
//! );
//! let registry = ResourceRegistry::new()
//!     .with_source(Arc::new(DirectoryScanner::new("package", store.clone(), "resource")));
//! let resources = ResourceManager::new(Arc::new(registry))
//!     .with_protocol(Arc::new(DirectoryProtocol::new("package", store)));
//!
//! let activation = RoleActivator::new(Arc::new(resources)).activate("dev").await?;
//! println!("{}", activation.to_markdown());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`dpml`] | Tag vocabulary, `Block`/`Document`, reference tokens and the parser |
//! | [`storage`] | `ResourceStore` trait with in-memory and on-disk stores |
//! | [`registry`] | Process-wide resource index with single-flight bootstrap and discovery sources |
//! | [`protocol`] | `ProtocolResolver` trait and the protocol registration table |
//! | [`resource`] | `ResourceManager`, the generic `resolve(url)` entrypoint |
//! | [`compose`] | `SemanticComposer`: recursive inlining with a per-call visited set |
//! | [`cognition`] | Concept graph, mermaid serialization, procedural flows |
//! | [`activation`] | `RoleActivator`: lookup → parse → compose → prime |
//! | [`config`] | `EngineConfig`, loadable from YAML or JSON |
//! | [`error`] | `PersonaError` with thiserror |
//!
//! ## Failure model
//!
//! - A reference that cannot be resolved becomes an inline marker; the rest of
//!   the document still composes and the role is reported `PartiallyFailed`.
//! - Parse errors in the role itself and registry bootstrap failures are
//!   returned to the caller.
//! - The procedural pass never fails; it yields an empty string instead.

pub mod activation;
pub mod cognition;
pub mod compose;
pub mod config;
pub mod dpml;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod resource;
pub mod storage;

pub use activation::{Activation, RoleActivator};
pub use error::{PersonaError, PersonaResult};
