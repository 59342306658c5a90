//! DigitalOcean provider for Tidepool
//!
//! This crate implements the `DropletProvider` trait for DigitalOcean,
//! letting Tidepool create, resize, power-cycle and destroy droplets.
//!
//! # Requirements
//!
//! - `doctl` CLI must be installed
//! - Authentication comes from a doctl auth context or an explicit access token
//!
//! # Example
//!
//! ```ignore
//! use tidepool_cloud::DropletProvider;
//! use tidepool_cloud_digitalocean::DigitalOceanProvider;
//!
//! let provider = DigitalOceanProvider::new(Some("team-a".into()), None);
//!
//! let auth = provider.check_auth().await?;
//! if !auth.can_write() {
//!     panic!("Token cannot manage droplets: {:?}", auth.error);
//! }
//! ```

pub mod doctl;
pub mod error;
pub mod provider;

pub use doctl::{CreateDropletConfig, Doctl, DropletInfo};
pub use error::{DoctlError, Result};
pub use provider::DigitalOceanProvider;
