//! prep compiler: turns template identities into invocable artifacts.
//!
//! # Architecture
//!
//! ```text
//! Identity ──▶ ArtifactCache ──▶ lex ─▶ parse ─▶ generate ──▶ Artifact
//!                  │    ▲                                        │
//!                  ▼    │                                        ▼
//!              persisted artifact (.prepc)            run / get_output / call
//! ```
//!
//! The [`ArtifactCache`] is an explicit object, constructed once and shared
//! by `Arc`. It owns two in-memory maps (text checksum and source path to
//! artifact), each behind a lock, and persists file templates next to their
//! source. It hands out each [`Artifact`] inside a [`TemplateHandle`] that
//! owns a reference to the cache, so `include()` from the template always
//! goes through the cache that built it.
//!
//! [`batch`] compiles or cleans whole directories.

pub mod artifact;
pub mod batch;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod persist;

pub use artifact::{Artifact, TemplateHandle};
pub use cache::{ArtifactCache, Identity, ResolvedFile};
pub use checksum::{checksum, compat_tag, COMPILER_VERSION};
pub use config::CompilerConfig;
pub use error::{CompileError, CompileResult};
