//! Material network translation.

pub mod network;
pub mod remap;
pub mod translator;

pub use network::{MaterialNetwork, ShaderConnection, ShaderNode};
pub use translator::{NodeIdentityCache, ShaderGraphTranslator, TranslatedGraph};
