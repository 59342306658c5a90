//! In-memory droplet provider
//!
//! Keeps droplets in a map and answers immediately. Used for dry runs of the
//! CLI and for exercising the lifecycle engine in tests. Failures can be
//! queued per operation kind to drive the error paths.

use crate::action::{CreateDropletRequest, ObservedStatus, PowerAction};
use crate::error::{CloudError, Result};
use crate::provider::{AuthStatus, DropletProvider};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Operation kinds that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimulatedCall {
    Create,
    Delete,
    Resize,
    Power,
}

#[derive(Debug, Clone)]
struct SimulatedDroplet {
    size: String,
    status: ObservedStatus,
}

/// Droplet provider backed by process memory
pub struct SimulatedProvider {
    droplets: Mutex<HashMap<String, SimulatedDroplet>>,
    failures: Mutex<VecDeque<SimulatedCall>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
    read_only: bool,
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self {
            droplets: Mutex::new(HashMap::new()),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100_000),
            read_only: false,
        }
    }

    /// Report a read-only token from `check_auth`
    pub fn with_read_only_token(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Register a droplet that already exists on the provider side
    ///
    /// Numeric ids move the id counter past them, so later creates never
    /// collide with seeded droplets.
    pub async fn seed(
        &self,
        backend_id: impl Into<String>,
        size: impl Into<String>,
        status: ObservedStatus,
    ) {
        let backend_id = backend_id.into();
        if let Ok(id) = backend_id.parse::<u64>() {
            self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        }
        self.droplets.lock().await.insert(
            backend_id,
            SimulatedDroplet {
                size: size.into(),
                status,
            },
        );
    }

    /// Make the next call of the given kind fail
    pub async fn fail_next(&self, call: SimulatedCall) {
        self.failures.lock().await.push_back(call);
    }

    /// Every call received so far, in order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Size slug currently recorded for a droplet
    pub async fn size_of(&self, backend_id: &str) -> Option<String> {
        self.droplets
            .lock()
            .await
            .get(backend_id)
            .map(|d| d.size.clone())
    }

    async fn record(&self, call: SimulatedCall, description: String) -> Result<()> {
        tracing::debug!("simulated provider: {}", description);
        self.calls.lock().await.push(description.clone());

        let mut failures = self.failures.lock().await;
        if let Some(pos) = failures.iter().position(|f| *f == call) {
            failures.remove(pos);
            return Err(CloudError::Rejected(description));
        }
        Ok(())
    }
}

#[async_trait]
impl DropletProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    fn display_name(&self) -> &str {
        "Simulated provider"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        if self.read_only {
            Ok(AuthStatus::read_only("simulated"))
        } else {
            Ok(AuthStatus::ok("simulated"))
        }
    }

    async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<String> {
        self.record(SimulatedCall::Create, format!("create {}", request.name))
            .await?;

        let backend_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.droplets.lock().await.insert(
            backend_id.clone(),
            SimulatedDroplet {
                size: request.size.clone(),
                status: ObservedStatus::Active,
            },
        );
        Ok(backend_id)
    }

    async fn delete_droplet(&self, backend_id: &str) -> Result<()> {
        self.record(SimulatedCall::Delete, format!("delete {}", backend_id))
            .await?;

        self.droplets
            .lock()
            .await
            .remove(backend_id)
            .map(|_| ())
            .ok_or_else(|| CloudError::DropletNotFound(backend_id.to_string()))
    }

    async fn resize_droplet(&self, backend_id: &str, size: &str, permanent: bool) -> Result<()> {
        self.record(
            SimulatedCall::Resize,
            format!("resize {} {} {}", backend_id, size, permanent),
        )
        .await?;

        let mut droplets = self.droplets.lock().await;
        let droplet = droplets
            .get_mut(backend_id)
            .ok_or_else(|| CloudError::DropletNotFound(backend_id.to_string()))?;
        droplet.size = size.to_string();
        Ok(())
    }

    async fn power_action(&self, backend_id: &str, action: PowerAction) -> Result<()> {
        self.record(SimulatedCall::Power, format!("{} {}", action, backend_id))
            .await?;

        let mut droplets = self.droplets.lock().await;
        let droplet = droplets
            .get_mut(backend_id)
            .ok_or_else(|| CloudError::DropletNotFound(backend_id.to_string()))?;
        droplet.status = match action {
            PowerAction::Start | PowerAction::Restart => ObservedStatus::Active,
            PowerAction::Stop => ObservedStatus::Off,
        };
        Ok(())
    }

    async fn droplet_status(&self, backend_id: &str) -> Result<ObservedStatus> {
        self.droplets
            .lock()
            .await
            .get(backend_id)
            .map(|d| d.status)
            .ok_or_else(|| CloudError::DropletNotFound(backend_id.to_string()))
    }
}
