//! Pure-Rust [`CatalogReader`] for security catalogs (`.cat`).

use crate::domain::constants::OID_CTL;
use crate::domain::pkcs7::ctl::{parse_trust_list, CatalogMember};
use crate::domain::pkcs7::SignedMessage;
use crate::infra::error::{SimulationError, SimulationResult};
use crate::services::catalog_index::{CatalogLog, CatalogReader};
use std::fs;
use std::path::Path;
use std::vec;

/// Decodes catalogs as PKCS#7 `SignedData` wrapping a certificate trust list.
#[derive(Debug, Clone, Copy, Default)]
pub struct CtlCatalogReader;

impl CtlCatalogReader {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Members of the catalog at `path`.
    pub fn read_members(&self, path: &Path) -> SimulationResult<Vec<CatalogMember>> {
        let bytes = fs::read(path).map_err(|e| {
            SimulationError::CatalogError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let message = SignedMessage::decode(&bytes)?;
        if message.content_type() != OID_CTL {
            return Err(SimulationError::CatalogError(format!(
                "{} is not a certificate trust list (content type {})",
                path.display(),
                message.content_type()
            )));
        }
        match message.content() {
            Some(content) => parse_trust_list(content),
            None => Ok(Vec::new()),
        }
    }
}

/// Members decoded up front and handed out in file order.
struct CtlLog {
    members: vec::IntoIter<CatalogMember>,
}

impl CatalogLog for CtlLog {
    fn next_member(&mut self) -> SimulationResult<Option<CatalogMember>> {
        Ok(self.members.next())
    }
}

impl CatalogReader for CtlCatalogReader {
    fn open<'a>(&'a self, catalog: &Path) -> SimulationResult<Box<dyn CatalogLog + 'a>> {
        let members = self.read_members(catalog)?;
        log::trace!("{} member(s) in {}", members.len(), catalog.display());
        Ok(Box::new(CtlLog {
            members: members.into_iter(),
        }))
    }
}
