//! Time samples, instance transform composition and deformation motion.

pub mod composer;
pub mod motion;
pub mod sampled;

pub use composer::{ComposedInstances, compose_instances};
pub use motion::{PositionKeys, extrapolate_positions};
pub use sampled::SampledArray;
