//! Reconciliation of mirrored provider state.
//!
//! - [`Reconciler`]: the periodic loop and its one-shot [`Reconciler::tick`]
//! - [`LoopState`]: lifecycle states
//! - [`ReconcileReport`]: per-tick counters
//! - [`ReconcileError`]: why a tick was cut short

mod errors;
mod reconciler;

pub use errors::ReconcileError;
pub use reconciler::{LoopState, ReconcileReport, Reconciler};
