//! Tidepool lifecycle engine
//!
//! Tracks droplets through their lifecycle and runtime states, charges their
//! footprint against per-scope quotas and turns accepted commands into
//! provider operations.
//!
//! A command is handled in two halves. [`DropletManager::create`] and
//! [`DropletManager::execute`] validate the request, record the in-flight
//! operation and return an [`Intent`]. The [`Dispatcher`] runs the intent
//! against a provider and sends a [`Completion`] back, which
//! [`DropletManager::handle`] applies. Completions carry the token of the
//! operation they answer, so late or repeated results are ignored.

pub mod catalog;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod quota;
pub mod resize;
pub mod state;
pub mod store;

/// Project link quotas are accounted against
pub type ScopeId = String;

pub type DropletId = uuid::Uuid;

// Re-exports
pub use catalog::{Catalog, Distribution, Image, Region, Size};
pub use command::{CommandKind, Effect, Transition, ensure_admissible};
pub use dispatch::Dispatcher;
pub use error::{Result, TidepoolError};
pub use manager::{
    Command, Completion, CreateDroplet, Dispatch, DropletManager, Finalized, Intent,
};
pub use quota::{QuotaDelta, QuotaError, QuotaLedger, QuotaSnapshot, QuotaUsage};
pub use resize::ResizePlan;
pub use state::{
    Dimensions, Droplet, LifecycleState, OperationToken, PendingOperation, Rollback,
    RuntimeState,
};
pub use store::{Snapshot, StateLock, StateStore};
