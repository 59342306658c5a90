//! Command kinds with their admissibility and transition tables
//!
//! Each command declares the (lifecycle, runtime) pairs under which it may
//! run, and what happens to the droplet when it is dispatched, when the
//! provider confirms it and when the provider reports a failure.
//!
//! | Command | Admissible when            | Dispatch          | Success                     | Failure              |
//! |---------|----------------------------|-------------------|-----------------------------|----------------------|
//! | create  | no backend id              | reserve footprint | OK, online, set backend id  | erred, rollback      |
//! | delete  | OK or erred                | deleting          | remove, release footprint   | erred                |
//! | start   | OK and offline             |                   | online                      | runtime unknown      |
//! | stop    | OK and online              |                   | offline                     | runtime unknown      |
//! | restart | OK and online              |                   | online                      | runtime unknown      |
//! | resize  | OK and offline             | updating, resize  | OK                          | erred, rollback      |

use crate::error::{Result, TidepoolError};
use crate::state::{Droplet, LifecycleState, RuntimeState};
use serde::{Deserialize, Serialize};

use LifecycleState as L;
use RuntimeState as R;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Delete,
    Start,
    Stop,
    Restart,
    Resize,
}

/// Side effect attached to a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Charge the droplet footprint to its scope, validated against limits
    ReserveFootprint,
    /// Apply resize quota deltas and the new dimensions
    ApplyResize,
    /// Store the backend id carried by the provider receipt
    AssignBackendId,
    /// Drop the record and release its footprint
    Remove,
    /// Undo everything recorded in the pending operation's rollback
    Rollback,
}

/// State changes applied at one step of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub lifecycle: Option<LifecycleState>,
    pub runtime: Option<RuntimeState>,
    pub effect: Effect,
}

impl Transition {
    const fn new(
        lifecycle: Option<LifecycleState>,
        runtime: Option<RuntimeState>,
        effect: Effect,
    ) -> Self {
        Self {
            lifecycle,
            runtime,
            effect,
        }
    }
}

impl CommandKind {
    /// Precondition on the droplet's two state axes
    pub fn precondition(
        self,
        lifecycle: LifecycleState,
        runtime: RuntimeState,
        provisioned: bool,
    ) -> bool {
        match self {
            CommandKind::Create => !provisioned,
            CommandKind::Delete => matches!(lifecycle, L::Ok | L::Erred),
            CommandKind::Start => lifecycle == L::Ok && runtime == R::Offline,
            CommandKind::Stop | CommandKind::Restart => lifecycle == L::Ok && runtime == R::Online,
            CommandKind::Resize => lifecycle == L::Ok && runtime == R::Offline,
        }
    }

    /// Human readable form of [`CommandKind::precondition`]
    pub fn requirement(self) -> &'static str {
        match self {
            CommandKind::Create => "a droplet without backend id",
            CommandKind::Delete => "state OK or erred",
            CommandKind::Start => "state OK and runtime offline",
            CommandKind::Stop | CommandKind::Restart => "state OK and runtime online",
            CommandKind::Resize => "state OK and runtime offline",
        }
    }

    /// Changes recorded before handing the operation to the provider
    ///
    /// A created droplet is born in `Creating`, so create has no lifecycle
    /// change here.
    pub fn on_dispatch(self) -> Transition {
        match self {
            CommandKind::Create => Transition::new(None, None, Effect::ReserveFootprint),
            CommandKind::Delete => Transition::new(Some(L::Deleting), None, Effect::None),
            CommandKind::Start | CommandKind::Stop | CommandKind::Restart => {
                Transition::new(None, None, Effect::None)
            }
            CommandKind::Resize => Transition::new(Some(L::Updating), None, Effect::ApplyResize),
        }
    }

    /// Changes applied once the provider confirms the operation
    pub fn on_success(self) -> Transition {
        match self {
            CommandKind::Create => {
                Transition::new(Some(L::Ok), Some(R::Online), Effect::AssignBackendId)
            }
            CommandKind::Delete => Transition::new(None, None, Effect::Remove),
            CommandKind::Start => Transition::new(None, Some(R::Online), Effect::None),
            CommandKind::Stop => Transition::new(None, Some(R::Offline), Effect::None),
            CommandKind::Restart => Transition::new(None, Some(R::Online), Effect::None),
            CommandKind::Resize => Transition::new(Some(L::Ok), None, Effect::None),
        }
    }

    /// Changes applied when the provider reports a failure
    pub fn on_failure(self) -> Transition {
        match self {
            CommandKind::Create => Transition::new(Some(L::Erred), None, Effect::Rollback),
            CommandKind::Delete => Transition::new(Some(L::Erred), None, Effect::None),
            CommandKind::Start | CommandKind::Stop | CommandKind::Restart => {
                Transition::new(None, Some(R::Unknown), Effect::None)
            }
            CommandKind::Resize => Transition::new(Some(L::Erred), None, Effect::Rollback),
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Create => write!(f, "create"),
            CommandKind::Delete => write!(f, "delete"),
            CommandKind::Start => write!(f, "start"),
            CommandKind::Stop => write!(f, "stop"),
            CommandKind::Restart => write!(f, "restart"),
            CommandKind::Resize => write!(f, "resize"),
        }
    }
}

/// Gate in front of every command
///
/// Fails with `ConflictingState` when the droplet has an operation in flight
/// or its states do not satisfy the command's precondition.
pub fn ensure_admissible(kind: CommandKind, droplet: &Droplet) -> Result<()> {
    if let Some(pending) = &droplet.pending {
        return Err(TidepoolError::ConflictingState {
            droplet: droplet.name.clone(),
            command: kind,
            reason: format!(
                "{} operation {} is still in progress",
                pending.kind, pending.token
            ),
        });
    }

    if !kind.precondition(droplet.lifecycle, droplet.runtime, droplet.is_provisioned()) {
        return Err(TidepoolError::ConflictingState {
            droplet: droplet.name.clone(),
            command: kind,
            reason: format!(
                "droplet is {}/{}, {} requires {}",
                droplet.lifecycle,
                droplet.runtime,
                kind,
                kind.requirement()
            ),
        });
    }

    Ok(())
}
