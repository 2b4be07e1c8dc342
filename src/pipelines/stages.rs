//! Per-file decision stages.
//!
//! Stages run in the order of [`FILE_STAGES`] and the first one that decides
//! ends the evaluation. The signature stage always decides.

use crate::domain::candidate::CandidateFile;
use crate::domain::policy::PolicyModel;
use crate::domain::verdict::{Decision, DenialReason, SignerDecision};
use crate::infra::error::SimulationError;
use crate::services::arbitrator::Arbitrator;
use crate::services::catalog_index::CatalogIndex;
use crate::services::hash_engine::HashEngine;
use crate::services::signer_extractor::SignerExtractor;
use std::path::PathBuf;

/// Shared, read-only inputs of every stage.
pub struct StageContext<'a> {
    pub policy: &'a PolicyModel,
    pub hash_engine: &'a HashEngine,
    pub extractor: &'a SignerExtractor,
    pub catalogs: &'a CatalogIndex,
    /// Lowercase extensions with a leading dot.
    pub unsigned_extensions: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Decided(Decision),
    Continue,
}

pub type Stage = fn(&StageContext<'_>, &CandidateFile) -> StageOutcome;

/// Ordered decision stages.
pub const FILE_STAGES: &[(&str, Stage)] = &[
    ("file-path", file_path_stage),
    ("hash", hash_stage),
    ("unsigned-extension", unsigned_extension_stage),
    ("signature", signature_stage),
];

/// Stage names in evaluation order.
#[must_use]
pub fn stage_order() -> Vec<&'static str> {
    FILE_STAGES.iter().map(|(name, _)| *name).collect()
}

/// Run the stages over `candidate` until one decides.
#[must_use]
pub fn evaluate(context: &StageContext<'_>, candidate: &CandidateFile) -> Decision {
    for (name, stage) in FILE_STAGES {
        if let StageOutcome::Decided(decision) = stage(context, candidate) {
            log::debug!(
                "{}: {} ({name} stage)",
                candidate.path().display(),
                decision.reason()
            );
            return decision;
        }
    }
    Decision::Unsigned
}

fn file_path_stage(context: &StageContext<'_>, candidate: &CandidateFile) -> StageOutcome {
    if context.policy.allows_path(candidate.path()) {
        StageOutcome::Decided(Decision::FilePath)
    } else {
        StageOutcome::Continue
    }
}

fn hash_stage(context: &StageContext<'_>, candidate: &CandidateFile) -> StageOutcome {
    let hashed = context.hash_engine.ci_hashes(candidate.path());
    // Each file is hashed once per run.
    context.hash_engine.cache().evict(candidate.path());
    let hashes = match hashed {
        Ok(hashes) => candidate.record_hashes(hashes),
        Err(e) => {
            log::warn!("Cannot hash {}: {e}", candidate.path().display());
            return StageOutcome::Decided(Decision::Signer(SignerDecision::Denied(
                DenialReason::Inaccessible,
            )));
        }
    };
    if context.policy.allows_hash(&hashes.authenticode_sha256)
        || context.policy.allows_hash(&hashes.authenticode_sha1)
    {
        StageOutcome::Decided(Decision::Hash)
    } else {
        StageOutcome::Continue
    }
}

fn unsigned_extension_stage(context: &StageContext<'_>, candidate: &CandidateFile) -> StageOutcome {
    let unsigned = candidate
        .extension()
        .is_some_and(|ext| context.unsigned_extensions.iter().any(|u| u == ext));
    if unsigned {
        StageOutcome::Decided(Decision::Unsigned)
    } else {
        StageOutcome::Continue
    }
}

fn signature_stage(context: &StageContext<'_>, candidate: &CandidateFile) -> StageOutcome {
    let decision = match context.extractor.extract(candidate.path()) {
        Err(SimulationError::HashMismatch { .. }) => {
            Decision::Signer(SignerDecision::Denied(DenialReason::HashMismatch))
        }
        Err(e) => {
            log::warn!("Signer extraction failed for {}: {e}", candidate.path().display());
            Decision::Signer(SignerDecision::Denied(DenialReason::Unexpected(e.to_string())))
        }
        Ok(records) if records.is_empty() => catalog_decision(context, candidate),
        Ok(records) => {
            let ekus = records[0].signer_ekus();
            Decision::Signer(Arbitrator::new(context.policy).arbitrate(&records, &ekus, candidate))
        }
    };
    StageOutcome::Decided(decision)
}

fn catalog_match(context: &StageContext<'_>, candidate: &CandidateFile) -> Option<PathBuf> {
    let hashes = candidate.hashes()?;
    context
        .catalogs
        .lookup(&hashes.authenticode_sha1)
        .or_else(|| context.catalogs.lookup(&hashes.authenticode_sha256))
}

/// Decision for a file without embedded signers.
///
/// A catalog hit authorizes only through the catalog's own signer; a catalog
/// whose signer cannot be read denies the file.
fn catalog_decision(context: &StageContext<'_>, candidate: &CandidateFile) -> Decision {
    let Some(catalog_path) = catalog_match(context, candidate) else {
        return Decision::Unsigned;
    };

    let records = match context.extractor.extract(&catalog_path) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Cannot read signers of catalog {}: {e}", catalog_path.display());
            return Decision::Signer(SignerDecision::Denied(DenialReason::Unexpected(format!(
                "Catalog {}: {e}",
                catalog_path.display()
            ))));
        }
    };
    let certificate = records
        .first()
        .and_then(|record| record.chain().elements().first())
        .map(|cert| cert.summary());
    match certificate {
        Some(certificate) => Decision::CatalogSigned {
            catalog_path,
            certificate,
        },
        None => {
            log::warn!("Catalog {} has no valid signer", catalog_path.display());
            Decision::Signer(SignerDecision::Denied(DenialReason::Unexpected(format!(
                "Catalog {} has no valid signer",
                catalog_path.display()
            ))))
        }
    }
}
