//! Resize policy
//!
//! A flexible resize only changes cores and RAM and can be reverted later.
//! A permanent resize also grows the disk, which can never shrink again.

use crate::catalog::Size;
use crate::error::{Result, TidepoolError};
use crate::quota::{QuotaDelta, RAM, STORAGE, VCPU};
use crate::state::{Dimensions, Droplet};

/// Quota deltas and target dimensions of an accepted resize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePlan {
    /// Target size slug
    pub size: String,
    pub target: Dimensions,
    pub cores: i64,
    pub ram: i64,
    pub disk: i64,
    pub permanent: bool,
}

impl ResizePlan {
    /// Check a resize of `current` to `target` and compute its deltas
    pub fn new(current: &Droplet, target: &Size, permanent: bool) -> Result<Self> {
        if target.slug == current.size {
            return Err(TidepoolError::InvalidResize(format!(
                "droplet {} already has size {}",
                current.name, target.slug
            )));
        }

        if !target.available_in(&current.region) {
            return Err(TidepoolError::InvalidResize(format!(
                "size {} is not available in region {}",
                target.slug, current.region
            )));
        }

        if permanent {
            if target.disk < current.disk {
                return Err(TidepoolError::InvalidResize(format!(
                    "disk size cannot be decreased ({} MiB -> {} MiB)",
                    current.disk, target.disk
                )));
            }
        } else if target.disk != current.disk {
            return Err(TidepoolError::InvalidResize(format!(
                "disk size cannot be changed without permanent flag ({} MiB -> {} MiB)",
                current.disk, target.disk
            )));
        }

        let disk = if permanent {
            signed(target.disk) - signed(current.disk)
        } else {
            0
        };

        Ok(Self {
            size: target.slug.clone(),
            target: Dimensions {
                cores: target.cores,
                ram: target.ram,
                disk: if permanent { target.disk } else { current.disk },
            },
            cores: i64::from(target.cores) - i64::from(current.cores),
            ram: signed(target.ram) - signed(current.ram),
            disk,
            permanent,
        })
    }

    /// Non-zero deltas to submit to the ledger as one batch
    pub fn deltas(&self) -> Vec<QuotaDelta> {
        [(STORAGE, self.disk), (RAM, self.ram), (VCPU, self.cores)]
            .into_iter()
            .filter(|(_, delta)| *delta != 0)
            .map(|(name, delta)| QuotaDelta::new(name, delta))
            .collect()
    }

    pub fn mode(&self) -> &'static str {
        if self.permanent { "permanent" } else { "flexible" }
    }
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn droplet(cores: u32, ram: u64, disk: u64) -> Droplet {
        Droplet::new(
            "web-1",
            "spl-1",
            "ams3",
            "debian-12-x64",
            &size("current", cores, ram, disk),
        )
    }

    #[test]
    fn test_permanent_resize_to_bigger_size() {
        let plan = ResizePlan::new(
            &droplet(2, 2048, 10240),
            &size("bigger", 3, 3072, 20480),
            true,
        )
        .unwrap();

        assert_eq!(
            plan.deltas(),
            vec![
                QuotaDelta::new(STORAGE, 10240),
                QuotaDelta::new(RAM, 1024),
                QuotaDelta::new(VCPU, 1),
            ]
        );
        assert_eq!(plan.target.disk, 20480);
        assert_eq!(plan.size, "bigger");
        assert_eq!(plan.mode(), "permanent");
    }

    #[test]
    fn test_flexible_resize_rejects_disk_change() {
        let err = ResizePlan::new(
            &droplet(2, 2048, 20480),
            &size("smaller", 2, 2048, 10240),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, TidepoolError::InvalidResize(_)));
    }

    #[test]
    fn test_permanent_resize_rejects_disk_decrease() {
        let err = ResizePlan::new(
            &droplet(2, 2048, 20480),
            &size("smaller", 2, 2048, 10240),
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be decreased"));
    }

    #[test]
    fn test_flexible_resize_to_smaller_cpu() {
        let plan = ResizePlan::new(
            &droplet(3, 4096, 20480),
            &size("fewer-cores", 2, 4096, 20480),
            false,
        )
        .unwrap();

        assert_eq!(plan.deltas(), vec![QuotaDelta::new(VCPU, -1)]);
        assert_eq!(plan.target.cores, 2);
        assert_eq!(plan.mode(), "flexible");
    }

    #[test]
    fn test_same_size_is_rejected() {
        let current = droplet(2, 2048, 10240);
        let err = ResizePlan::new(&current, &size("current", 2, 2048, 10240), true).unwrap_err();
        assert!(err.to_string().contains("already has size"));
    }

    #[test]
    fn test_size_must_be_offered_in_region() {
        let mut target = size("bigger", 4, 8192, 10240);
        target.regions = vec!["nyc1".to_string()];
        let err = ResizePlan::new(&droplet(2, 2048, 10240), &target, false).unwrap_err();
        assert!(err.to_string().contains("not available in region ams3"));
    }
}
