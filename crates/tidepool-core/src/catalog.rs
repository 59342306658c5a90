//! Regions, images and sizes offered by the provider

use crate::error::{Result, TidepoolError};
use serde::{Deserialize, Serialize};

/// Operating system family of an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Distribution {
    Ubuntu,
    FreeBsd,
    CoreOs,
    Fedora,
    CentOs,
    Debian,
    Other(String),
}

impl Distribution {
    /// Images of these distributions only accept key-based logins
    pub fn is_ssh_key_mandatory(&self) -> bool {
        matches!(
            self,
            Distribution::Ubuntu | Distribution::FreeBsd | Distribution::CoreOs
        )
    }
}

impl From<String> for Distribution {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Ubuntu" => Distribution::Ubuntu,
            "FreeBSD" => Distribution::FreeBsd,
            "CoreOS" => Distribution::CoreOs,
            "Fedora" => Distribution::Fedora,
            "CentOS" => Distribution::CentOs,
            "Debian" => Distribution::Debian,
            _ => Distribution::Other(value),
        }
    }
}

impl From<Distribution> for String {
    fn from(value: Distribution) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distribution::Ubuntu => write!(f, "Ubuntu"),
            Distribution::FreeBsd => write!(f, "FreeBSD"),
            Distribution::CoreOs => write!(f, "CoreOS"),
            Distribution::Fedora => write!(f, "Fedora"),
            Distribution::CentOs => write!(f, "CentOS"),
            Distribution::Debian => write!(f, "Debian"),
            Distribution::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Provider slug (e.g., "ams3")
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Provider slug or id
    pub slug: String,

    pub name: String,

    pub distribution: Distribution,

    /// Minimum disk in MiB a size needs to run this image
    #[serde(default)]
    pub min_disk_size: Option<u64>,

    /// Regions offering the image, empty means all
    #[serde(default)]
    pub regions: Vec<String>,

    #[serde(default)]
    pub is_official: bool,
}

impl Image {
    pub fn is_ssh_key_mandatory(&self) -> bool {
        self.distribution.is_ssh_key_mandatory()
    }

    pub fn available_in(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.name, self.distribution, self.slug)
    }
}

/// Immutable size descriptor used as the target of create and resize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    /// Provider slug (e.g., "s-2vcpu-2gb")
    pub slug: String,

    pub cores: u32,

    /// MiB
    pub ram: u64,

    /// MiB
    pub disk: u64,

    /// Transfer bandwidth in MiB
    #[serde(default)]
    pub transfer: u64,

    /// Regions offering the size, empty means all
    #[serde(default)]
    pub regions: Vec<String>,
}

impl Size {
    pub fn available_in(&self, region: &str) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r == region)
    }
}

/// Everything the provider offers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub regions: Vec<Region>,

    #[serde(default)]
    pub images: Vec<Image>,

    #[serde(default)]
    pub sizes: Vec<Size>,
}

impl Catalog {
    pub fn region(&self, slug: &str) -> Result<&Region> {
        self.regions
            .iter()
            .find(|r| r.slug == slug)
            .ok_or_else(|| not_found("Region", slug))
    }

    pub fn image(&self, slug: &str) -> Result<&Image> {
        self.images
            .iter()
            .find(|i| i.slug == slug)
            .ok_or_else(|| not_found("Image", slug))
    }

    pub fn size(&self, slug: &str) -> Result<&Size> {
        self.sizes
            .iter()
            .find(|s| s.slug == slug)
            .ok_or_else(|| not_found("Size", slug))
    }

    /// Check that images and sizes only reference known regions
    pub fn validate(&self) -> Result<()> {
        let known = |region: &String| self.regions.iter().any(|r| &r.slug == region);

        for image in &self.images {
            if let Some(region) = image.regions.iter().find(|r| !known(r)) {
                return Err(TidepoolError::Validation(format!(
                    "image {} references unknown region {}",
                    image.slug, region
                )));
            }
        }
        for size in &self.sizes {
            if let Some(region) = size.regions.iter().find(|r| !known(r)) {
                return Err(TidepoolError::Validation(format!(
                    "size {} references unknown region {}",
                    size.slug, region
                )));
            }
        }
        Ok(())
    }
}

fn not_found(kind: &'static str, slug: &str) -> TidepoolError {
    TidepoolError::CatalogEntryNotFound {
        kind,
        slug: slug.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog {
            regions: vec![Region {
                slug: "ams3".to_string(),
                name: "Amsterdam 3".to_string(),
            }],
            images: vec![Image {
                slug: "ubuntu-24-04-x64".to_string(),
                name: "24.04 x64".to_string(),
                distribution: Distribution::Ubuntu,
                min_disk_size: Some(15360),
                regions: vec!["ams3".to_string()],
                is_official: true,
            }],
            sizes: vec![Size {
                slug: "s-1vcpu-1gb".to_string(),
                cores: 1,
                ram: 1024,
                disk: 25600,
                transfer: 1048576,
                regions: vec!["fra1".to_string()],
            }],
        }
    }

    #[test]
    fn test_ssh_key_mandatory_distributions() {
        assert!(Distribution::from("Ubuntu".to_string()).is_ssh_key_mandatory());
        assert!(Distribution::from("FreeBSD".to_string()).is_ssh_key_mandatory());
        assert!(Distribution::from("CoreOS".to_string()).is_ssh_key_mandatory());
        assert!(!Distribution::from("Debian".to_string()).is_ssh_key_mandatory());
        assert!(!Distribution::from("Arch".to_string()).is_ssh_key_mandatory());
    }

    #[test]
    fn test_distribution_round_trips_through_string() {
        let distribution = Distribution::from("FreeBSD".to_string());
        assert_eq!(String::from(distribution), "FreeBSD");
    }

    #[test]
    fn test_lookup() {
        let catalog = catalog();
        assert_eq!(catalog.region("ams3").unwrap().name, "Amsterdam 3");
        assert!(matches!(
            catalog.size("s-8vcpu-16gb"),
            Err(TidepoolError::CatalogEntryNotFound { kind: "Size", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_region() {
        let err = catalog().validate().unwrap_err();
        assert!(err.to_string().contains("fra1"));
    }

    #[test]
    fn test_region_availability() {
        let catalog = catalog();
        assert!(catalog.images[0].available_in("ams3"));
        assert!(!catalog.sizes[0].available_in("ams3"));
    }
}
