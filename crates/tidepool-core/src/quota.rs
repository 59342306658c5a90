//! Quota ledger
//!
//! Named usage counters (vcpu, ram, storage, droplet_count) tracked per scope.
//! Every scope owns its own mutex, so mutations inside one scope are
//! serialized and immediately visible to readers of that scope, while scopes
//! never contend with each other.

use crate::ScopeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

/// Number of virtual CPUs
pub const VCPU: &str = "vcpu";
/// RAM in MiB
pub const RAM: &str = "ram";
/// Disk in MiB
pub const STORAGE: &str = "storage";
/// Number of droplets
pub const DROPLET_COUNT: &str = "droplet_count";

const DEFAULT_DROPLET_COUNT_LIMIT: u64 = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Unknown quota counter: {0}")]
    UnknownCounter(String),

    #[error("Quota {name} exceeded in scope {scope}: usage {usage} {delta:+} > limit {limit}")]
    Exceeded {
        scope: String,
        name: String,
        usage: u64,
        delta: i64,
        limit: u64,
    },
}

pub type Result<T> = std::result::Result<T, QuotaError>;

/// Usage and limit of one counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub usage: u64,

    /// `None` means unlimited
    pub limit: Option<u64>,
}

impl QuotaUsage {
    fn empty(limit: Option<u64>) -> Self {
        Self { usage: 0, limit }
    }

    /// Remaining headroom, `None` when unlimited
    pub fn available(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.usage))
    }
}

/// Counters of one scope, keyed by counter name
pub type QuotaSnapshot = BTreeMap<String, QuotaUsage>;

/// A signed change to one counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDelta {
    pub name: String,
    pub delta: i64,
}

impl QuotaDelta {
    pub fn new(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            delta,
        }
    }

    /// The change that undoes this one
    pub fn inverse(&self) -> Self {
        Self::new(self.name.clone(), -self.delta)
    }
}

/// Per-scope quota counters
pub struct QuotaLedger {
    /// Registered counter names with the limit new scopes start with
    defaults: BTreeMap<String, Option<u64>>,
    scopes: RwLock<HashMap<ScopeId, Arc<Mutex<QuotaSnapshot>>>>,
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::for_droplets()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QuotaLedger {
    /// Create a ledger with the given counters and their default limits
    pub fn new<N: Into<String>>(counters: impl IntoIterator<Item = (N, Option<u64>)>) -> Self {
        Self {
            defaults: counters
                .into_iter()
                .map(|(name, limit)| (name.into(), limit))
                .collect(),
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// Counters used for droplets: vcpu, ram and storage unlimited, 50 droplets
    pub fn for_droplets() -> Self {
        Self::new([
            (VCPU, None),
            (RAM, None),
            (STORAGE, None),
            (DROPLET_COUNT, Some(DEFAULT_DROPLET_COUNT_LIMIT)),
        ])
    }

    /// Change the limit that scopes created from now on start with
    pub fn set_default_limit(&mut self, name: &str, limit: Option<u64>) -> Result<()> {
        let slot = self
            .defaults
            .get_mut(name)
            .ok_or_else(|| QuotaError::UnknownCounter(name.to_string()))?;
        *slot = limit;
        Ok(())
    }

    /// Limit new scopes start with for `name`
    pub fn default_limit(&self, name: &str) -> Result<Option<u64>> {
        self.defaults
            .get(name)
            .copied()
            .ok_or_else(|| QuotaError::UnknownCounter(name.to_string()))
    }

    /// Registered counter names
    pub fn counters(&self) -> impl Iterator<Item = &str> {
        self.defaults.keys().map(String::as_str)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.defaults.contains_key(name) {
            Ok(())
        } else {
            Err(QuotaError::UnknownCounter(name.to_string()))
        }
    }

    /// Counters of a scope, created on first use
    fn scope(&self, scope: &str) -> Arc<Mutex<QuotaSnapshot>> {
        if let Some(existing) = self
            .scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
        {
            return existing.clone();
        }

        let mut scopes = self.scopes.write().unwrap_or_else(PoisonError::into_inner);
        scopes
            .entry(scope.to_string())
            .or_insert_with(|| {
                tracing::debug!("Initializing quota counters for scope {}", scope);
                let counters = self
                    .defaults
                    .iter()
                    .map(|(name, limit)| (name.clone(), QuotaUsage::empty(*limit)))
                    .collect();
                Arc::new(Mutex::new(counters))
            })
            .clone()
    }

    /// Unconditionally raise a counter
    pub fn increase(&self, scope: &str, name: &str, amount: u64) -> Result<()> {
        self.add_with_validation(scope, name, clamp_i64(amount), false)
    }

    /// Unconditionally lower a counter
    ///
    /// Callers must not decrease below zero; the counter saturates at zero if
    /// they do.
    pub fn decrease(&self, scope: &str, name: &str, amount: u64) -> Result<()> {
        self.add_with_validation(scope, name, -clamp_i64(amount), false)
    }

    /// Apply `usage += delta`, checking the limit when `validate` is set and
    /// the delta is positive
    pub fn add_with_validation(
        &self,
        scope: &str,
        name: &str,
        delta: i64,
        validate: bool,
    ) -> Result<()> {
        self.apply_batch(scope, &[QuotaDelta::new(name, delta)], validate)
    }

    /// Apply several deltas to one scope, all or nothing
    ///
    /// Each positive delta is checked against its counter's limit when
    /// `validate` is set. If any check fails no counter is changed.
    pub fn apply_batch(&self, scope: &str, deltas: &[QuotaDelta], validate: bool) -> Result<()> {
        for d in deltas {
            self.check_name(&d.name)?;
        }

        let counters = self.scope(scope);
        let mut counters = lock(&counters);

        let mut staged: BTreeMap<&str, QuotaUsage> = BTreeMap::new();
        for d in deltas {
            let current = match staged.get(d.name.as_str()) {
                Some(usage) => *usage,
                None => counters
                    .get(&d.name)
                    .copied()
                    .unwrap_or_else(|| QuotaUsage::empty(self.defaults[&d.name])),
            };

            let next = i128::from(current.usage) + i128::from(d.delta);

            if validate && d.delta > 0 {
                if let Some(limit) = current.limit {
                    if next > i128::from(limit) {
                        return Err(QuotaError::Exceeded {
                            scope: scope.to_string(),
                            name: d.name.clone(),
                            usage: current.usage,
                            delta: d.delta,
                            limit,
                        });
                    }
                }
            }

            debug_assert!(
                next >= 0,
                "quota {} in scope {} decreased below zero",
                d.name,
                scope
            );
            let usage = if next < 0 {
                tracing::warn!(
                    "Quota {} in scope {} decreased below zero ({}), clamping",
                    d.name,
                    scope,
                    next
                );
                0
            } else {
                u64::try_from(next).unwrap_or(u64::MAX)
            };

            staged.insert(
                d.name.as_str(),
                QuotaUsage {
                    usage,
                    limit: current.limit,
                },
            );
        }

        for (name, usage) in staged {
            counters.insert(name.to_string(), usage);
        }
        Ok(())
    }

    /// Set the limit of one counter in one scope
    pub fn set_limit(&self, scope: &str, name: &str, limit: Option<u64>) -> Result<()> {
        self.check_name(name)?;
        let counters = self.scope(scope);
        let mut counters = lock(&counters);
        counters
            .entry(name.to_string())
            .or_insert_with(|| QuotaUsage::empty(limit))
            .limit = limit;
        Ok(())
    }

    /// Current usage and limit of every registered counter
    pub fn snapshot(&self, scope: &str) -> QuotaSnapshot {
        let counters = self.scope(scope);
        let counters = lock(&counters);
        self.defaults
            .iter()
            .map(|(name, limit)| {
                let usage = counters
                    .get(name)
                    .copied()
                    .unwrap_or_else(|| QuotaUsage::empty(*limit));
                (name.clone(), usage)
            })
            .collect()
    }

    /// Usage of a single counter
    pub fn usage(&self, scope: &str, name: &str) -> Result<u64> {
        self.check_name(name)?;
        Ok(self.snapshot(scope).get(name).map(|u| u.usage).unwrap_or(0))
    }

    /// Scopes that have counters
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes: Vec<ScopeId> = self
            .scopes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        scopes.sort();
        scopes
    }

    /// Drop a scope and its counters
    pub fn remove_scope(&self, scope: &str) -> Option<QuotaSnapshot> {
        let removed = self
            .scopes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(scope)?;
        let counters = lock(&removed).clone();
        Some(counters)
    }

    /// Load previously saved counters for a scope
    pub fn restore(&self, scope: &str, snapshot: &QuotaSnapshot) -> Result<()> {
        for name in snapshot.keys() {
            self.check_name(name)?;
        }
        let counters = self.scope(scope);
        let mut counters = lock(&counters);
        for (name, usage) in snapshot {
            counters.insert(name.clone(), *usage);
        }
        Ok(())
    }
}

fn clamp_i64(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> QuotaLedger {
        let ledger = QuotaLedger::for_droplets();
        ledger.set_limit("spl-1", VCPU, Some(4)).unwrap();
        ledger.set_limit("spl-1", RAM, Some(4096)).unwrap();
        ledger.set_limit("spl-1", STORAGE, Some(20480)).unwrap();
        ledger
    }

    #[test]
    fn test_counters_created_lazily() {
        let ledger = QuotaLedger::for_droplets();
        let snapshot = ledger.snapshot("fresh");
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.values().all(|u| u.usage == 0));
        assert_eq!(snapshot[DROPLET_COUNT].limit, Some(50));
    }

    #[test]
    fn test_increase_and_decrease() {
        let ledger = ledger();
        ledger.increase("spl-1", VCPU, 3).unwrap();
        ledger.decrease("spl-1", VCPU, 1).unwrap();
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 2);
    }

    #[test]
    fn test_unknown_counter() {
        let ledger = ledger();
        assert_eq!(
            ledger.increase("spl-1", "gpu", 1),
            Err(QuotaError::UnknownCounter("gpu".to_string()))
        );
    }

    #[test]
    fn test_validated_increase_over_limit_is_rejected() {
        let ledger = ledger();
        ledger.add_with_validation("spl-1", VCPU, 3, true).unwrap();

        let err = ledger.add_with_validation("spl-1", VCPU, 2, true).unwrap_err();
        assert!(matches!(err, QuotaError::Exceeded { usage: 3, limit: 4, .. }));
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 3);
    }

    #[test]
    fn test_unvalidated_increase_ignores_limit() {
        let ledger = ledger();
        ledger.add_with_validation("spl-1", VCPU, 10, false).unwrap();
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 10);
    }

    #[test]
    fn test_negative_delta_skips_limit_check() {
        let ledger = ledger();
        ledger.increase("spl-1", VCPU, 10).unwrap();
        ledger.add_with_validation("spl-1", VCPU, -2, true).unwrap();
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 8);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let ledger = ledger();
        let deltas = [
            QuotaDelta::new(RAM, 2048),
            QuotaDelta::new(VCPU, 2),
            QuotaDelta::new(STORAGE, 40960),
        ];

        let err = ledger.apply_batch("spl-1", &deltas, true).unwrap_err();
        assert!(matches!(err, QuotaError::Exceeded { ref name, .. } if name == STORAGE));

        let snapshot = ledger.snapshot("spl-1");
        assert_eq!(snapshot[RAM].usage, 0);
        assert_eq!(snapshot[VCPU].usage, 0);
        assert_eq!(snapshot[STORAGE].usage, 0);
    }

    #[test]
    fn test_batch_with_repeated_counter_accumulates() {
        let ledger = ledger();
        let deltas = [QuotaDelta::new(VCPU, 3), QuotaDelta::new(VCPU, 2)];
        assert!(ledger.apply_batch("spl-1", &deltas, true).is_err());
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 0);
    }

    #[test]
    fn test_scopes_are_independent() {
        let ledger = ledger();
        ledger.increase("spl-1", RAM, 1024).unwrap();
        assert_eq!(ledger.usage("spl-2", RAM).unwrap(), 0);
        assert_eq!(ledger.scopes(), vec!["spl-1".to_string(), "spl-2".to_string()]);
    }

    #[test]
    fn test_remove_and_restore_scope() {
        let ledger = ledger();
        ledger.increase("spl-1", STORAGE, 10240).unwrap();

        let saved = ledger.remove_scope("spl-1").unwrap();
        assert!(ledger.scopes().is_empty());

        ledger.restore("spl-1", &saved).unwrap();
        assert_eq!(ledger.usage("spl-1", STORAGE).unwrap(), 10240);
        assert_eq!(ledger.snapshot("spl-1")[STORAGE].limit, Some(20480));
    }

    #[test]
    fn test_concurrent_validated_increases_respect_limit() {
        let ledger = Arc::new(ledger());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || ledger.add_with_validation("spl-1", VCPU, 1, true))
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(accepted, 4);
        assert_eq!(ledger.usage("spl-1", VCPU).unwrap(), 4);
    }
}
