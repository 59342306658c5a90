//! Droplet record and its two state axes
//!
//! A droplet carries a lifecycle state (bookkeeping of the local record) and
//! a runtime state (power state of the remote machine). The axes move
//! independently: a droplet can be `OK` and `Offline` at the same time.

use crate::catalog::Size;
use crate::command::CommandKind;
use crate::error::{Result, TidepoolError};
use crate::quota::{DROPLET_COUNT, QuotaDelta, RAM, STORAGE, VCPU};
use crate::{DropletId, ScopeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tidepool_cloud::ObservedStatus;
use uuid::Uuid;

/// Lifecycle of the local droplet record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Waiting for the provider to create the droplet
    Creating,
    /// Idle, accepts commands
    Ok,
    /// A resize is in flight
    Updating,
    /// Waiting for the provider to destroy the droplet
    Deleting,
    /// The last operation failed
    Erred,
}

impl LifecycleState {
    /// Whether the lifecycle may move from `self` to `next`
    ///
    /// Removal of the record is only possible from `Deleting` and is handled
    /// by the manager, not expressed as a state.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Creating, Ok)
                | (Creating, Erred)
                | (Ok, Updating)
                | (Ok, Deleting)
                | (Updating, Ok)
                | (Updating, Erred)
                | (Deleting, Erred)
                | (Erred, Deleting)
        )
    }

    /// Creating, Updating and Deleting wait for the provider
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            LifecycleState::Creating | LifecycleState::Updating | LifecycleState::Deleting
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Creating => write!(f, "creating"),
            LifecycleState::Ok => write!(f, "OK"),
            LifecycleState::Updating => write!(f, "updating"),
            LifecycleState::Deleting => write!(f, "deleting"),
            LifecycleState::Erred => write!(f, "erred"),
        }
    }
}

/// Power state of the remote machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Provisioning,
    Online,
    Offline,
    Unknown,
}

impl RuntimeState {
    /// Whether a command result may move the runtime from `self` to `next`
    ///
    /// Restarting keeps an online droplet online. Recovering from `Unknown`
    /// needs a provider observation, see [`Droplet::observe`].
    pub fn can_transition_to(self, next: RuntimeState) -> bool {
        use RuntimeState::*;
        matches!(
            (self, next),
            (_, Unknown)
                | (Provisioning, Online)
                | (Provisioning, Offline)
                | (Online, Offline)
                | (Offline, Online)
                | (Online, Online)
        )
    }

    /// Runtime state implied by a provider status, if any
    pub fn from_observed(status: ObservedStatus) -> Option<RuntimeState> {
        match status {
            ObservedStatus::Active => Some(RuntimeState::Online),
            ObservedStatus::Off => Some(RuntimeState::Offline),
            ObservedStatus::Archive | ObservedStatus::Unknown => Some(RuntimeState::Unknown),
            // still booting, nothing to learn yet
            ObservedStatus::New => None,
        }
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeState::Provisioning => write!(f, "provisioning"),
            RuntimeState::Online => write!(f, "online"),
            RuntimeState::Offline => write!(f, "offline"),
            RuntimeState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Correlation token tying a provider result to the operation that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationToken(Uuid);

impl OperationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billable dimensions of a droplet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub cores: u32,
    /// MiB
    pub ram: u64,
    /// MiB
    pub disk: u64,
}

/// What to undo if an in-flight operation fails
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rollback {
    /// Size slug before the operation
    pub size: Option<String>,
    /// Dimensions before the operation
    pub dimensions: Option<Dimensions>,
    /// Quota deltas applied when the operation was dispatched
    pub quota: Vec<QuotaDelta>,
}

/// Operation waiting for a provider result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub token: OperationToken,
    pub kind: CommandKind,
    #[serde(default)]
    pub rollback: Rollback,
    pub started_at: DateTime<Utc>,
}

impl PendingOperation {
    pub fn new(kind: CommandKind, rollback: Rollback) -> Self {
        Self {
            token: OperationToken::new(),
            kind,
            rollback,
            started_at: Utc::now(),
        }
    }
}

/// A managed droplet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Droplet {
    pub id: DropletId,

    pub name: String,

    /// Project link the droplet is billed to
    pub scope: ScopeId,

    /// Provider id, set once the provider confirms creation
    pub backend_id: Option<String>,

    pub region: String,

    pub image: String,

    /// Size slug
    pub size: String,

    pub cores: u32,

    /// MiB
    pub ram: u64,

    /// MiB
    pub disk: u64,

    /// Transfer bandwidth in MiB
    pub transfer: u64,

    pub lifecycle: LifecycleState,

    pub runtime: RuntimeState,

    #[serde(default)]
    pub pending: Option<PendingOperation>,

    #[serde(default)]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Droplet {
    /// New record waiting for creation
    pub fn new(
        name: impl Into<String>,
        scope: impl Into<ScopeId>,
        region: impl Into<String>,
        image: impl Into<String>,
        size: &Size,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            scope: scope.into(),
            backend_id: None,
            region: region.into(),
            image: image.into(),
            size: size.slug.clone(),
            cores: size.cores,
            ram: size.ram,
            disk: size.disk,
            transfer: size.transfer,
            lifecycle: LifecycleState::Creating,
            runtime: RuntimeState::Provisioning,
            pending: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            cores: self.cores,
            ram: self.ram,
            disk: self.disk,
        }
    }

    pub fn set_dimensions(&mut self, dimensions: Dimensions) {
        self.cores = dimensions.cores;
        self.ram = dimensions.ram;
        self.disk = dimensions.disk;
        self.touch();
    }

    /// Quota charged for this droplet while it exists on the provider
    pub fn footprint(&self) -> Vec<QuotaDelta> {
        vec![
            QuotaDelta::new(VCPU, i64::from(self.cores)),
            QuotaDelta::new(RAM, to_delta(self.ram)),
            QuotaDelta::new(STORAGE, to_delta(self.disk)),
            QuotaDelta::new(DROPLET_COUNT, 1),
        ]
    }

    /// Whether the provider holds this droplet, meaning its footprint is charged
    pub fn is_provisioned(&self) -> bool {
        self.backend_id.is_some()
    }

    pub fn set_lifecycle(&mut self, next: LifecycleState) -> Result<()> {
        if !self.lifecycle.can_transition_to(next) {
            return Err(TidepoolError::InvalidTransition {
                axis: "lifecycle",
                from: self.lifecycle.to_string(),
                to: next.to_string(),
            });
        }
        self.lifecycle = next;
        self.touch();
        Ok(())
    }

    pub fn set_runtime(&mut self, next: RuntimeState) -> Result<()> {
        if !self.runtime.can_transition_to(next) {
            return Err(TidepoolError::InvalidTransition {
                axis: "runtime",
                from: self.runtime.to_string(),
                to: next.to_string(),
            });
        }
        self.runtime = next;
        self.touch();
        Ok(())
    }

    /// Apply a provider observation to the runtime axis
    ///
    /// Observations are authoritative, so they also lift a droplet out of
    /// `Unknown`. Returns whether the runtime changed.
    pub fn observe(&mut self, status: ObservedStatus) -> bool {
        match RuntimeState::from_observed(status) {
            Some(next) if next != self.runtime => {
                self.runtime = next;
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// Record the provider id; it can only be set once
    pub fn set_backend_id(&mut self, backend_id: impl Into<String>) -> Result<()> {
        let backend_id = backend_id.into();
        if let Some(existing) = &self.backend_id {
            return Err(TidepoolError::InvalidTransition {
                axis: "backend id",
                from: existing.clone(),
                to: backend_id,
            });
        }
        self.backend_id = Some(backend_id);
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn to_delta(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size() -> Size {
        Size {
            slug: "s-2vcpu-2gb".to_string(),
            cores: 2,
            ram: 2048,
            disk: 10240,
            transfer: 102400,
            regions: Vec::new(),
        }
    }

    #[test]
    fn test_new_droplet_is_creating() {
        let droplet = Droplet::new("web-1", "spl-1", "ams3", "debian-12-x64", &size());
        assert_eq!(droplet.lifecycle, LifecycleState::Creating);
        assert_eq!(droplet.runtime, RuntimeState::Provisioning);
        assert!(droplet.backend_id.is_none());
        assert_eq!(droplet.cores, 2);
    }

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Creating.can_transition_to(Ok));
        assert!(Creating.can_transition_to(Erred));
        assert!(Ok.can_transition_to(Updating));
        assert!(Ok.can_transition_to(Deleting));
        assert!(Updating.can_transition_to(Ok));
        assert!(Deleting.can_transition_to(Erred));
        assert!(Erred.can_transition_to(Deleting));

        assert!(!Erred.can_transition_to(Ok));
        assert!(!Erred.can_transition_to(Updating));
        assert!(!Creating.can_transition_to(Updating));
        assert!(!Updating.can_transition_to(Deleting));
        assert!(!Deleting.can_transition_to(Ok));
    }

    #[test]
    fn test_runtime_transitions() {
        use RuntimeState::*;
        assert!(Provisioning.can_transition_to(Online));
        assert!(Online.can_transition_to(Offline));
        assert!(Offline.can_transition_to(Online));
        assert!(Offline.can_transition_to(Unknown));
        assert!(!Unknown.can_transition_to(Online));
        assert!(!Online.can_transition_to(Provisioning));
    }

    #[test]
    fn test_illegal_lifecycle_transition_is_rejected() {
        let mut droplet = Droplet::new("web-1", "spl-1", "ams3", "debian-12-x64", &size());
        let err = droplet.set_lifecycle(LifecycleState::Updating).unwrap_err();
        assert!(matches!(err, TidepoolError::InvalidTransition { axis: "lifecycle", .. }));
        assert_eq!(droplet.lifecycle, LifecycleState::Creating);
    }

    #[test]
    fn test_backend_id_is_set_once() {
        let mut droplet = Droplet::new("web-1", "spl-1", "ams3", "debian-12-x64", &size());
        droplet.set_backend_id("1001").unwrap();
        assert!(droplet.set_backend_id("1002").is_err());
        assert_eq!(droplet.backend_id.as_deref(), Some("1001"));
    }

    #[test]
    fn test_observation_recovers_unknown_runtime() {
        let mut droplet = Droplet::new("web-1", "spl-1", "ams3", "debian-12-x64", &size());
        droplet.runtime = RuntimeState::Unknown;

        assert!(droplet.observe(ObservedStatus::Off));
        assert_eq!(droplet.runtime, RuntimeState::Offline);
        assert!(!droplet.observe(ObservedStatus::New));
    }

    #[test]
    fn test_footprint() {
        let droplet = Droplet::new("web-1", "spl-1", "ams3", "debian-12-x64", &size());
        assert_eq!(
            droplet.footprint(),
            vec![
                QuotaDelta::new(VCPU, 2),
                QuotaDelta::new(RAM, 2048),
                QuotaDelta::new(STORAGE, 10240),
                QuotaDelta::new(DROPLET_COUNT, 1),
            ]
        );
    }
}
