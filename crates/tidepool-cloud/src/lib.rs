//! Tidepool droplet provider abstraction
//!
//! This crate defines the provider-client side of Tidepool: the calls the
//! lifecycle engine hands off to a cloud backend, and the receipts that come
//! back.
//!
//! # Providers
//!
//! - **DigitalOcean**: droplets via the `doctl` CLI (`tidepool-cloud-digitalocean`)
//! - **Simulated**: in-memory provider for dry runs and tests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   tide CLI                       │
//! └─────────────────┬───────────────────────────────┘
//!                   │ commands
//! ┌─────────────────▼───────────────────────────────┐
//! │               tidepool-core                      │
//! │  state machine ─ quota ledger ─ resize policy    │
//! └─────────────────┬───────────────────────────────┘
//!                   │ ProviderOperation / ProviderReceipt
//! ┌─────────────────▼───────────────────────────────┐
//! │               tidepool-cloud                     │
//! │  trait DropletProvider { ... }                   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ digitalocean  │ │   simulated   │
//! │  (doctl CLI)  │ │  (in memory)  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod simulated;

// Re-exports
pub use action::{
    CreateDropletRequest, ObservedStatus, PowerAction, ProviderOperation, ProviderReceipt,
};
pub use error::{CloudError, Result};
pub use provider::{AuthStatus, DropletProvider};
pub use simulated::{SimulatedCall, SimulatedProvider};
