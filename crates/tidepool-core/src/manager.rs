//! Droplet manager
//!
//! Owns the droplet records and the quota ledger. Commands are accepted or
//! rejected synchronously; accepted ones leave a pending operation on the
//! droplet and come back as an [`Intent`] for the dispatcher. The matching
//! [`Completion`] finishes the operation.
//!
//! Lock order is droplet record, then the record map, then a ledger scope.
//! The map lock is never held while waiting for a droplet.

use crate::catalog::{Image, Region, Size};
use crate::command::{CommandKind, Effect, ensure_admissible};
use crate::error::{Result, TidepoolError};
use crate::quota::{QuotaDelta, QuotaLedger};
use crate::resize::ResizePlan;
use crate::state::{Droplet, OperationToken, PendingOperation, Rollback};
use crate::{DropletId, ScopeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tidepool_cloud::{
    CreateDropletRequest, ObservedStatus, PowerAction, ProviderOperation, ProviderReceipt,
};
use tracing::{debug, error, info, warn};

/// Request to create a droplet, with catalog entries already resolved
#[derive(Debug, Clone)]
pub struct CreateDroplet {
    pub name: String,
    pub scope: ScopeId,
    pub region: Region,
    pub image: Image,
    pub size: Size,
    pub ssh_key: Option<String>,
}

impl CreateDroplet {
    /// Check the request against the catalog entries it names
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TidepoolError::Validation(
                "droplet name must not be empty".to_string(),
            ));
        }

        if self.image.is_ssh_key_mandatory() && self.ssh_key.is_none() {
            return Err(TidepoolError::Validation(format!(
                "an SSH key is required for {} images",
                self.image.distribution
            )));
        }

        if !self.image.available_in(&self.region.slug) {
            return Err(TidepoolError::Validation(format!(
                "image {} is not available in region {}",
                self.image.slug, self.region.slug
            )));
        }

        if !self.size.available_in(&self.region.slug) {
            return Err(TidepoolError::Validation(format!(
                "size {} is not available in region {}",
                self.size.slug, self.region.slug
            )));
        }

        if let Some(min_disk) = self.image.min_disk_size {
            if self.size.disk < min_disk {
                return Err(TidepoolError::Validation(format!(
                    "image {} needs at least {} MiB of disk, size {} has {} MiB",
                    self.image.slug, min_disk, self.size.slug, self.size.disk
                )));
            }
        }

        Ok(())
    }
}

/// Command against an existing droplet
#[derive(Debug, Clone)]
pub enum Command {
    Delete,
    Start,
    Stop,
    Restart,
    Resize { size: Size, permanent: bool },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Delete => CommandKind::Delete,
            Command::Start => CommandKind::Start,
            Command::Stop => CommandKind::Stop,
            Command::Restart => CommandKind::Restart,
            Command::Resize { .. } => CommandKind::Resize,
        }
    }
}

/// Provider work for an accepted command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub token: OperationToken,
    pub droplet_id: DropletId,
    pub kind: CommandKind,
    pub operation: ProviderOperation,
}

impl Intent {
    /// Wrap a provider result into the completion for this intent
    pub fn complete(&self, result: std::result::Result<ProviderReceipt, String>) -> Completion {
        Completion {
            token: self.token,
            droplet_id: self.droplet_id,
            result,
        }
    }
}

/// Provider result for an [`Intent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub token: OperationToken,
    pub droplet_id: DropletId,
    pub result: std::result::Result<ProviderReceipt, String>,
}

/// Outcome of an accepted command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The provider has to run this intent
    Scheduled(Intent),
    /// Nothing to ask the provider, the command already took effect
    Finished(Droplet),
}

/// Outcome of applying a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    Updated(Droplet),
    Removed(Droplet),
    /// Unknown droplet or stale token
    Ignored,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DropletManager {
    ledger: Arc<QuotaLedger>,
    droplets: RwLock<HashMap<DropletId, Arc<Mutex<Droplet>>>>,
}

impl Default for DropletManager {
    fn default() -> Self {
        Self::new(Arc::new(QuotaLedger::for_droplets()))
    }
}

impl DropletManager {
    pub fn new(ledger: Arc<QuotaLedger>) -> Self {
        Self {
            ledger,
            droplets: RwLock::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// Accept a create request
    ///
    /// The footprint is reserved before the intent is returned, so two
    /// creates in the same scope can never overrun a limit together.
    pub fn create(&self, request: CreateDroplet) -> Result<Intent> {
        request.validate()?;

        let mut droplet = Droplet::new(
            request.name.clone(),
            request.scope.clone(),
            request.region.slug.clone(),
            request.image.slug.clone(),
            &request.size,
        );
        let token = self.begin(&mut droplet, CommandKind::Create, None)?;

        let intent = Intent {
            token,
            droplet_id: droplet.id,
            kind: CommandKind::Create,
            operation: ProviderOperation::Create(CreateDropletRequest {
                name: request.name,
                region: request.region.slug,
                image: request.image.slug,
                size: request.size.slug,
                ssh_key: request.ssh_key,
            }),
        };

        info!(
            droplet = %droplet.name,
            scope = %droplet.scope,
            size = %droplet.size,
            "Droplet {} has been scheduled to create",
            droplet.name
        );
        self.write_map()
            .insert(droplet.id, Arc::new(Mutex::new(droplet)));

        Ok(intent)
    }

    /// Accept a command against an existing droplet
    pub fn execute(&self, id: DropletId, command: Command) -> Result<Dispatch> {
        let entry = self
            .entry(id)
            .ok_or_else(|| TidepoolError::DropletNotFound(id.to_string()))?;
        let mut droplet = lock(&entry);
        let kind = command.kind();

        ensure_admissible(kind, &droplet)?;

        let Some(backend_id) = droplet.backend_id.clone() else {
            if kind == CommandKind::Delete {
                // never reached the provider, nothing to release
                self.write_map().remove(&id);
                info!(droplet = %droplet.name, "Droplet {} has been removed", droplet.name);
                return Ok(Dispatch::Finished(droplet.clone()));
            }
            return Err(TidepoolError::ConflictingState {
                droplet: droplet.name.clone(),
                command: kind,
                reason: "droplet has no backend id".to_string(),
            });
        };

        let (operation, plan) = match &command {
            Command::Delete => (ProviderOperation::Delete { backend_id }, None),
            Command::Start => (power(backend_id, PowerAction::Start), None),
            Command::Stop => (power(backend_id, PowerAction::Stop), None),
            Command::Restart => (power(backend_id, PowerAction::Restart), None),
            Command::Resize { size, permanent } => {
                let plan = ResizePlan::new(&droplet, size, *permanent)?;
                let operation = ProviderOperation::Resize {
                    backend_id,
                    size: size.slug.clone(),
                    permanent: *permanent,
                };
                (operation, Some(plan))
            }
        };

        let token = self.begin(&mut droplet, kind, plan.as_ref())?;

        match &plan {
            Some(plan) => info!(
                droplet = %droplet.name,
                size = %plan.size,
                "Droplet {} has been scheduled to {} resize",
                droplet.name,
                plan.mode()
            ),
            None => info!(
                droplet = %droplet.name,
                "Droplet {} has been scheduled to {}",
                droplet.name,
                kind
            ),
        }

        Ok(Dispatch::Scheduled(Intent {
            token,
            droplet_id: id,
            kind,
            operation,
        }))
    }

    /// Apply the dispatch transition of `kind` and record the pending operation
    ///
    /// Works on a copy of the record so a rejected quota batch leaves the
    /// droplet untouched.
    fn begin(
        &self,
        droplet: &mut Droplet,
        kind: CommandKind,
        plan: Option<&ResizePlan>,
    ) -> Result<OperationToken> {
        let transition = kind.on_dispatch();
        let mut next = droplet.clone();
        let mut rollback = Rollback::default();

        if let Some(lifecycle) = transition.lifecycle {
            next.set_lifecycle(lifecycle)?;
        }
        if let Some(runtime) = transition.runtime {
            next.set_runtime(runtime)?;
        }

        match transition.effect {
            Effect::ReserveFootprint => {
                let footprint = next.footprint();
                self.ledger.apply_batch(&next.scope, &footprint, true)?;
                rollback.quota = footprint;
            }
            Effect::ApplyResize => {
                let plan = plan.ok_or_else(|| TidepoolError::ConflictingState {
                    droplet: next.name.clone(),
                    command: kind,
                    reason: "resize without a plan".to_string(),
                })?;
                let deltas = plan.deltas();
                self.ledger.apply_batch(&next.scope, &deltas, true)?;
                rollback.quota = deltas;
                rollback.size = Some(next.size.clone());
                rollback.dimensions = Some(next.dimensions());
                next.set_dimensions(plan.target);
                next.size = plan.size.clone();
            }
            _ => {}
        }

        let pending = PendingOperation::new(kind, rollback);
        let token = pending.token;
        next.pending = Some(pending);
        next.error_message = None;
        *droplet = next;

        debug!(droplet = %droplet.name, %token, "Recorded pending {}", kind);
        Ok(token)
    }

    /// Provider confirmed the operation identified by `token`
    pub fn on_complete(
        &self,
        id: DropletId,
        token: OperationToken,
        receipt: ProviderReceipt,
    ) -> Result<Finalized> {
        self.finish(id, token, Ok(receipt))
    }

    /// Provider failed the operation identified by `token`
    pub fn on_failure(
        &self,
        id: DropletId,
        token: OperationToken,
        message: impl Into<String>,
    ) -> Result<Finalized> {
        self.finish(id, token, Err(message.into()))
    }

    pub fn handle(&self, completion: Completion) -> Result<Finalized> {
        self.finish(completion.droplet_id, completion.token, completion.result)
    }

    fn finish(
        &self,
        id: DropletId,
        token: OperationToken,
        result: std::result::Result<ProviderReceipt, String>,
    ) -> Result<Finalized> {
        let Some(entry) = self.entry(id) else {
            warn!(droplet_id = %id, %token, "Ignoring completion for unknown droplet");
            return Ok(Finalized::Ignored);
        };
        let mut droplet = lock(&entry);

        let pending = match &droplet.pending {
            Some(pending) if pending.token == token => pending.clone(),
            _ => {
                warn!(droplet = %droplet.name, %token, "Ignoring stale completion");
                return Ok(Finalized::Ignored);
            }
        };
        let kind = pending.kind;

        // a create is only confirmed by a backend id
        let result = match result {
            Ok(ProviderReceipt::Completed) if kind == CommandKind::Create => {
                Err("provider did not return a backend id".to_string())
            }
            other => other,
        };

        let transition = match &result {
            Ok(_) => kind.on_success(),
            Err(_) => kind.on_failure(),
        };

        let mut next = droplet.clone();
        next.pending = None;

        if let Some(lifecycle) = transition.lifecycle {
            next.set_lifecycle(lifecycle)?;
        }
        if let Some(runtime) = transition.runtime {
            next.set_runtime(runtime)?;
        }

        match transition.effect {
            Effect::AssignBackendId => {
                if let Ok(ProviderReceipt::Created { backend_id }) = &result {
                    next.set_backend_id(backend_id.clone())?;
                }
            }
            Effect::Rollback => {
                let rollback = pending.rollback;
                if let Some(dimensions) = rollback.dimensions {
                    next.set_dimensions(dimensions);
                }
                if let Some(size) = rollback.size {
                    next.size = size;
                }
                let inverse: Vec<QuotaDelta> =
                    rollback.quota.iter().map(QuotaDelta::inverse).collect();
                self.ledger.apply_batch(&next.scope, &inverse, false)?;
            }
            Effect::Remove => {
                let release: Vec<QuotaDelta> =
                    next.footprint().iter().map(QuotaDelta::inverse).collect();
                self.ledger.apply_batch(&next.scope, &release, false)?;
                self.write_map().remove(&id);
                *droplet = next.clone();
                info!(droplet = %next.name, "Droplet {} has been deleted", next.name);
                return Ok(Finalized::Removed(next));
            }
            Effect::None | Effect::ReserveFootprint | Effect::ApplyResize => {}
        }

        match &result {
            Ok(_) => {
                next.error_message = None;
                info!(
                    droplet = %next.name,
                    state = %next.lifecycle,
                    runtime = %next.runtime,
                    "Droplet {} finished {}",
                    next.name,
                    kind
                );
            }
            Err(message) => {
                error!(
                    droplet = %next.name,
                    state = %next.lifecycle,
                    runtime = %next.runtime,
                    "Droplet {} failed to {}: {}",
                    next.name,
                    kind,
                    message
                );
                next.error_message = Some(message.clone());
            }
        }

        *droplet = next.clone();
        Ok(Finalized::Updated(next))
    }

    /// Apply a provider status observation to an idle droplet
    ///
    /// Droplets with a pending operation or without a backend id are left
    /// alone; the operation result is authoritative for them.
    pub fn observe_runtime(&self, id: DropletId, status: ObservedStatus) -> Result<Droplet> {
        let entry = self
            .entry(id)
            .ok_or_else(|| TidepoolError::DropletNotFound(id.to_string()))?;
        let mut droplet = lock(&entry);

        if droplet.pending.is_some() || !droplet.is_provisioned() {
            debug!(droplet = %droplet.name, "Skipping observation of busy droplet");
            return Ok(droplet.clone());
        }

        let previous = droplet.runtime;
        if droplet.observe(status) {
            info!(
                droplet = %droplet.name,
                "Droplet {} is now {} (was {})",
                droplet.name,
                droplet.runtime,
                previous
            );
        }
        Ok(droplet.clone())
    }

    pub fn get(&self, id: DropletId) -> Option<Droplet> {
        self.entry(id).map(|entry| lock(&entry).clone())
    }

    /// Look a droplet up by id or by name
    pub fn find(&self, key: &str) -> Result<Droplet> {
        if let Ok(id) = key.parse::<DropletId>() {
            return self
                .get(id)
                .ok_or_else(|| TidepoolError::DropletNotFound(key.to_string()));
        }

        let mut matches = self.list().into_iter().filter(|d| d.name == key);
        match (matches.next(), matches.next()) {
            (Some(droplet), None) => Ok(droplet),
            (Some(_), Some(_)) => Err(TidepoolError::Validation(format!(
                "several droplets are named {}, use the id",
                key
            ))),
            (None, _) => Err(TidepoolError::DropletNotFound(key.to_string())),
        }
    }

    /// All droplets, ordered by creation time
    pub fn list(&self) -> Vec<Droplet> {
        let entries: Vec<Arc<Mutex<Droplet>>> = self
            .droplets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut droplets: Vec<Droplet> = entries.iter().map(|entry| lock(entry).clone()).collect();
        droplets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        droplets
    }

    /// Droplets billed to `scope`
    pub fn list_scope(&self, scope: &str) -> Vec<Droplet> {
        self.list()
            .into_iter()
            .filter(|d| d.scope == scope)
            .collect()
    }

    /// Put a loaded record back under management without touching quotas
    pub fn insert(&self, droplet: Droplet) {
        self.write_map()
            .insert(droplet.id, Arc::new(Mutex::new(droplet)));
    }

    fn entry(&self, id: DropletId) -> Option<Arc<Mutex<Droplet>>> {
        self.droplets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn write_map(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<DropletId, Arc<Mutex<Droplet>>>> {
        self.droplets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn power(backend_id: String, action: PowerAction) -> ProviderOperation {
    ProviderOperation::Power { backend_id, action }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Distribution;
    use crate::quota::{DROPLET_COUNT, RAM, STORAGE, VCPU};
    use crate::state::{LifecycleState, RuntimeState};

    fn region() -> Region {
        Region {
            slug: "ams3".to_string(),
            name: "Amsterdam 3".to_string(),
        }
    }

    fn image(distribution: Distribution) -> Image {
        Image {
            slug: "debian-12-x64".to_string(),
            name: "12 x64".to_string(),
            distribution,
            min_disk_size: Some(10240),
            regions: Vec::new(),
            is_official: true,
        }
    }

    fn size(slug: &str, cores: u32, ram: u64, disk: u64) -> Size {
        Size {
            slug: slug.to_string(),
            cores,
            ram,
            disk,
            transfer: 0,
            regions: Vec::new(),
        }
    }

    fn request(name: &str) -> CreateDroplet {
        CreateDroplet {
            name: name.to_string(),
            scope: "spl-1".to_string(),
            region: region(),
            image: image(Distribution::Debian),
            size: size("s-2vcpu-2gb", 2, 2048, 10240),
            ssh_key: None,
        }
    }

    fn created(manager: &DropletManager, name: &str) -> DropletId {
        let intent = manager.create(request(name)).unwrap();
        let receipt = ProviderReceipt::Created {
            backend_id: format!("{}-backend", name),
        };
        manager
            .on_complete(intent.droplet_id, intent.token, receipt)
            .unwrap();
        intent.droplet_id
    }

    #[test]
    fn test_validate_requires_ssh_key_for_ubuntu() {
        let mut request = request("web-1");
        request.image = image(Distribution::Ubuntu);
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("SSH key"));

        request.ssh_key = Some("ab:cd".to_string());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_min_disk() {
        let mut request = request("web-1");
        request.size = size("tiny", 1, 512, 5120);
        let err = request.validate().unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_create_reserves_footprint() {
        let manager = DropletManager::default();
        let intent = manager.create(request("web-1")).unwrap();

        let snapshot = manager.ledger().snapshot("spl-1");
        assert_eq!(snapshot[VCPU].usage, 2);
        assert_eq!(snapshot[RAM].usage, 2048);
        assert_eq!(snapshot[STORAGE].usage, 10240);
        assert_eq!(snapshot[DROPLET_COUNT].usage, 1);

        let droplet = manager.get(intent.droplet_id).unwrap();
        assert_eq!(droplet.lifecycle, LifecycleState::Creating);
        assert_eq!(droplet.pending.unwrap().token, intent.token);
    }

    #[test]
    fn test_power_cycle() {
        let manager = DropletManager::default();
        let id = created(&manager, "web-1");

        let Dispatch::Scheduled(stop) = manager.execute(id, Command::Stop).unwrap() else {
            panic!("stop should reach the provider");
        };
        manager
            .on_complete(id, stop.token, ProviderReceipt::Completed)
            .unwrap();
        assert_eq!(manager.get(id).unwrap().runtime, RuntimeState::Offline);

        let Dispatch::Scheduled(start) = manager.execute(id, Command::Start).unwrap() else {
            panic!("start should reach the provider");
        };
        manager
            .on_failure(id, start.token, "action errored")
            .unwrap();
        let droplet = manager.get(id).unwrap();
        assert_eq!(droplet.runtime, RuntimeState::Unknown);
        assert_eq!(droplet.lifecycle, LifecycleState::Ok);
        assert_eq!(droplet.error_message.as_deref(), Some("action errored"));
    }

    #[test]
    fn test_stale_token_is_ignored() {
        let manager = DropletManager::default();
        let id = created(&manager, "web-1");

        let outcome = manager
            .on_complete(id, OperationToken::new(), ProviderReceipt::Completed)
            .unwrap();
        assert_eq!(outcome, Finalized::Ignored);
    }

    #[test]
    fn test_delete_without_backend_id_is_local() {
        let manager = DropletManager::default();
        let intent = manager.create(request("web-1")).unwrap();
        manager
            .on_failure(intent.droplet_id, intent.token, "no capacity")
            .unwrap();

        let outcome = manager.execute(intent.droplet_id, Command::Delete).unwrap();
        assert!(matches!(outcome, Dispatch::Finished(_)));
        assert!(manager.get(intent.droplet_id).is_none());
    }

    #[test]
    fn test_find_by_name_and_id() {
        let manager = DropletManager::default();
        let id = created(&manager, "web-1");

        assert_eq!(manager.find("web-1").unwrap().id, id);
        assert_eq!(manager.find(&id.to_string()).unwrap().name, "web-1");
        assert_eq!(manager.find("db-1").unwrap_err().status_code(), 404);
    }

    #[test]
    fn test_observation_skips_pending_droplet() {
        let manager = DropletManager::default();
        let intent = manager.create(request("web-1")).unwrap();

        let droplet = manager
            .observe_runtime(intent.droplet_id, ObservedStatus::Off)
            .unwrap();
        assert_eq!(droplet.runtime, RuntimeState::Provisioning);
    }
}
