//! Incremental translation of a host scene graph into renderer nodes.
//!
//! Host values are marshalled onto typed renderer parameters ([`marshal`]),
//! primitives are re-translated step by step from their dirty bits
//! ([`sync`]), material networks become renderer node graphs with stable
//! node identity ([`shader_graph`]), and point instancers and deforming
//! points get composed transforms and motion keys ([`instancing`]).

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod instancing;
pub mod marshal;
pub mod prims;
pub mod scene;
pub mod shader_graph;
pub mod sync;
pub mod universe;
pub mod value;

pub use catalog::{RenderCatalog, load_default_catalog};
pub use config::TranslatorConfig;
pub use context::RenderContext;
pub use error::{Diagnostic, DiagnosticKind, Diagnostics, RenderError, TranslateError};
pub use scene::{MemoryScene, SceneDelegate};
pub use sync::{ChangeTracker, DirtyBits, RenderParam, SyncEngine};
pub use universe::{NodeHandle, ParamValue, RenderUniverse};
pub use value::{AssetPath, Token, Value};
