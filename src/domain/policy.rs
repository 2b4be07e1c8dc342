//! In-memory App Control policy model.
//!
//! The model is what an XML policy parser would produce: allowed hashes,
//! allowed paths, signer rules and the allow-all flag. It is read from JSON
//! or TOML.

use crate::domain::pe::{FileVersion, FileVersionInfo};
use crate::infra::error::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File attributes referenced by a signer rule.
///
/// An attribute whose original file name is `*` only constrains the version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAttribute {
    pub id: String,
    /// Attributes without a minimum version never apply.
    pub minimum_version: Option<FileVersion>,
    pub original_file_name: Option<String>,
    pub internal_name: Option<String>,
    pub file_description: Option<String>,
    pub product_name: Option<String>,
    /// Which of the names the rule was built from, reported with a match.
    pub specific_file_name_level: Option<String>,
}

impl FileAttribute {
    /// Version-only attribute.
    #[must_use]
    pub fn signed_version(minimum: FileVersion) -> Self {
        Self {
            minimum_version: Some(minimum),
            original_file_name: Some("*".to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.original_file_name.as_deref() == Some("*")
    }

    /// Whether the file's version reaches the minimum. Unknown versions and
    /// attributes without a minimum never qualify.
    #[must_use]
    pub fn version_satisfied(&self, info: &FileVersionInfo) -> bool {
        match (self.minimum_version, info.version) {
            (Some(minimum), Some(version)) => version >= minimum,
            _ => false,
        }
    }

    /// Whether any name present on both sides matches, ignoring case.
    #[must_use]
    pub fn names_match(&self, info: &FileVersionInfo) -> bool {
        let pairs = [
            (&self.internal_name, &info.internal_name),
            (&self.file_description, &info.file_description),
            (&self.product_name, &info.product_name),
            (&self.original_file_name, &info.original_file_name),
        ];
        pairs.iter().any(|(wanted, actual)| match (wanted, actual) {
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            _ => false,
        })
    }
}

/// A signer rule: a pinned certificate (by TBS hash) plus constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerRule {
    pub id: String,
    /// Common name of the pinned certificate.
    pub name: String,
    /// TBS hash of the pinned certificate.
    pub cert_root: String,
    /// Leaf common name required by publisher-level rules.
    #[serde(default)]
    pub cert_publisher: Option<String>,
    /// At least one of these EKUs must be present on the file's signer.
    #[serde(default)]
    pub cert_ekus: Vec<String>,
    /// Program name the WHQL signature's opus info must carry.
    #[serde(default)]
    pub cert_oem_id: Option<String>,
    /// WHQL rules match only through WHQL-signed chains.
    #[serde(default)]
    pub whql: bool,
    #[serde(default)]
    pub file_attributes: Vec<FileAttribute>,
    /// Deny rules never authorize anything.
    #[serde(default = "default_allowed")]
    pub allowed: bool,
}

fn default_allowed() -> bool {
    true
}

impl SignerRule {
    #[must_use]
    pub fn new(id: &str, name: &str, cert_root: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            cert_root: cert_root.to_ascii_uppercase(),
            cert_publisher: None,
            cert_ekus: Vec::new(),
            cert_oem_id: None,
            whql: false,
            file_attributes: Vec::new(),
            allowed: true,
        }
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: &str) -> Self {
        self.cert_publisher = Some(publisher.to_string());
        self
    }

    #[must_use]
    pub fn with_ekus(mut self, ekus: &[&str]) -> Self {
        self.cert_ekus = ekus.iter().map(|eku| (*eku).to_string()).collect();
        self
    }

    /// Shorthand for a single version-only file attribute.
    #[must_use]
    pub fn with_minimum_version(self, version: FileVersion) -> Self {
        self.with_file_attribute(FileAttribute::signed_version(version))
    }

    #[must_use]
    pub fn with_file_attribute(mut self, attribute: FileAttribute) -> Self {
        self.file_attributes.push(attribute);
        self
    }

    /// Mark the rule as WHQL, optionally requiring an OEM program name.
    #[must_use]
    pub fn whql(mut self, oem_id: Option<&str>) -> Self {
        self.whql = true;
        self.cert_oem_id = oem_id.map(str::to_string);
        self
    }

    #[must_use]
    pub fn denied(mut self) -> Self {
        self.allowed = false;
        self
    }
}

/// Policy rules consumed read-only by the simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyModel {
    /// Where the policy came from; keys the single allow-all verdict.
    pub source: Option<PathBuf>,
    pub allow_all: bool,
    allowed_hashes: HashSet<String>,
    allowed_paths: HashSet<PathBuf>,
    signers: Vec<SignerRule>,
}

impl PolicyModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a policy from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> SimulationResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SimulationError::PolicyError(format!("Failed to read policy {}: {e}", path.display()))
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let mut policy = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        policy.source.get_or_insert_with(|| path.to_path_buf());
        Ok(policy)
    }

    pub fn from_json_str(content: &str) -> SimulationResult<Self> {
        let policy: Self = serde_json::from_str(content)?;
        policy.normalized()
    }

    pub fn from_toml_str(content: &str) -> SimulationResult<Self> {
        let policy: Self = toml::from_str(content)?;
        policy.normalized()
    }

    fn normalized(mut self) -> SimulationResult<Self> {
        self.allowed_hashes = self
            .allowed_hashes
            .iter()
            .map(|hash| hash.trim().to_ascii_uppercase())
            .collect();
        for signer in &mut self.signers {
            signer.cert_root = signer.cert_root.trim().to_ascii_uppercase();
            if signer.cert_root.is_empty() {
                return Err(SimulationError::PolicyError(format!(
                    "Signer rule '{}' has no certificate root",
                    signer.id
                )));
            }
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_allow_all(mut self) -> Self {
        self.allow_all = true;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn allow_hash(&mut self, hash: &str) {
        self.allowed_hashes.insert(hash.trim().to_ascii_uppercase());
    }

    pub fn allow_path(&mut self, path: impl Into<PathBuf>) {
        self.allowed_paths.insert(path.into());
    }

    pub fn add_signer(&mut self, rule: SignerRule) {
        self.signers.push(rule);
    }

    #[must_use]
    pub fn allows_path(&self, path: &Path) -> bool {
        self.allowed_paths.contains(path)
    }

    #[must_use]
    pub fn allows_hash(&self, hash: &str) -> bool {
        self.allowed_hashes.contains(&hash.to_ascii_uppercase())
    }

    #[must_use]
    pub fn signers(&self) -> &[SignerRule] {
        &self.signers
    }

    /// Key used for the single verdict of an allow-all run.
    #[must_use]
    pub fn identity(&self) -> PathBuf {
        self.source
            .clone()
            .unwrap_or_else(|| PathBuf::from("<policy>"))
    }
}
