//! The synchronization layer: mutation engine, invalidation graph, draft
//! autosave, and the `SyncCore` root facade.

pub mod core;
pub mod draft;
pub mod invalidation;
pub mod mutation;

pub use self::core::SyncCore;
pub use draft::{AutosaveConfig, DraftAutosave, DraftTransport};
pub use invalidation::{EntityChange, InvalidationGraph};
pub use mutation::{MutationEngine, MutationPlan, MutationState, MutationTask, Tracked};
