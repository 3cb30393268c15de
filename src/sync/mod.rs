//! Incremental synchronization of primitive records.
//!
//! The host marks [`DirtyBits`] on a shared [`ChangeTracker`]. A pass folds
//! them into the record, runs the [`SyncStep`]s they trigger in their fixed
//! order, and clears only the bits of the steps that completed.

pub mod dirty;
pub mod engine;
pub mod interrupt;
pub mod record;

pub use dirty::{ChangeTracker, DirtyBits, SyncStep};
pub use engine::SyncEngine;
pub use interrupt::{InterruptScope, MotionTiming, RenderCoordinator, RenderParam};
pub use record::{PassReport, PrimitiveRecord};
