//! `Simulation`: runs every candidate file through the decision stages on a
//! fixed pool of worker threads.
//!
//! The catalog index is built before any worker starts. Workers take a
//! static, ceiling-divided chunk of the file list each, record one verdict
//! per file into a shared map, and bump a processed counter that the
//! progress ticker samples.

use crate::adapters::{CtlCatalogReader, PortableHashPrimitive, PortableTrustVerifier};
use crate::domain::candidate::CandidateFile;
use crate::domain::pe::HashRangeCache;
use crate::domain::policy::PolicyModel;
use crate::domain::verdict::{Decision, DenialReason, SignerDecision, Verdict, VerdictSource};
use crate::infra::cancel::CancellationToken;
use crate::infra::config::SimulationConfiguration;
use crate::infra::error::{SimulationError, SimulationResult};
use crate::infra::progress::{NullProgress, ProgressReporter, ProgressTicker};
use crate::pipelines::stages::{self, StageContext};
use crate::services::catalog_index::{CatalogIndex, CatalogReader};
use crate::services::hash_engine::{HashEngine, HashPrimitive};
use crate::services::signer_extractor::{SignerExtractor, TrustVerifier};
use dashmap::DashMap;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Files to evaluate and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRequest {
    pub files: Vec<PathBuf>,
    /// Worker count; values below 1 are treated as 1.
    pub threads: usize,
    /// Catalog directories to index. `None` leaves the index empty.
    pub catalog_roots: Option<Vec<PathBuf>>,
}

impl SimulationRequest {
    #[must_use]
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            threads: 2,
            catalog_roots: None,
        }
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_catalog_roots(mut self, roots: Option<Vec<PathBuf>>) -> Self {
        self.catalog_roots = roots;
        self
    }
}

/// Verdicts of one run.
#[derive(Debug, Default)]
pub struct SimulationReport {
    verdicts: DashMap<PathBuf, Verdict>,
    cancelled: bool,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    cancelled: bool,
    summary: BTreeMap<VerdictSource, usize>,
    verdicts: &'a [Verdict],
}

impl SimulationReport {
    fn record(&self, verdict: Verdict) {
        self.verdicts.insert(verdict.file_path().to_path_buf(), verdict);
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Verdict> {
        self.verdicts.get(path).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verdicts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verdicts.is_empty()
    }

    /// Whether the run stopped early. Files not reached have no verdict.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    #[must_use]
    pub fn all_authorized(&self) -> bool {
        self.verdicts.iter().all(|entry| entry.value().is_authorized())
    }

    /// Verdicts ordered by path.
    #[must_use]
    pub fn sorted(&self) -> Vec<Verdict> {
        let mut verdicts: Vec<Verdict> = self
            .verdicts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        verdicts.sort_by(|a, b| a.file_path().cmp(b.file_path()));
        verdicts
    }

    /// Verdict count per source.
    #[must_use]
    pub fn summary(&self) -> BTreeMap<VerdictSource, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.verdicts {
            *counts.entry(entry.value().source()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_json(&self) -> SimulationResult<String> {
        let verdicts = self.sorted();
        let document = ReportDocument {
            cancelled: self.cancelled,
            summary: self.summary(),
            verdicts: &verdicts,
        };
        serde_json::to_string_pretty(&document).map_err(|e| {
            SimulationError::InvalidInput(format!("Failed to serialize report: {e}"))
        })
    }
}

/// Simulation of a policy over a set of files.
pub struct Simulation {
    policy: PolicyModel,
    config: SimulationConfiguration,
    hash_primitive: Arc<dyn HashPrimitive>,
    trust_verifier: Arc<dyn TrustVerifier>,
    catalog_reader: Arc<dyn CatalogReader>,
    progress: Arc<dyn ProgressReporter>,
    cancellation: CancellationToken,
    range_cache: Arc<HashRangeCache>,
}

impl Simulation {
    /// Simulation with the portable platform adapters and silent progress.
    #[must_use]
    pub fn new(policy: PolicyModel) -> Self {
        Self {
            policy,
            config: SimulationConfiguration::default(),
            hash_primitive: Arc::new(PortableHashPrimitive::new()),
            trust_verifier: Arc::new(PortableTrustVerifier::new()),
            catalog_reader: Arc::new(CtlCatalogReader::new()),
            progress: Arc::new(NullProgress),
            cancellation: CancellationToken::new(),
            range_cache: Arc::new(HashRangeCache::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SimulationConfiguration) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_hash_primitive(mut self, primitive: Arc<dyn HashPrimitive>) -> Self {
        self.hash_primitive = primitive;
        self
    }

    #[must_use]
    pub fn with_trust_verifier(mut self, verifier: Arc<dyn TrustVerifier>) -> Self {
        self.trust_verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_catalog_reader(mut self, reader: Arc<dyn CatalogReader>) -> Self {
        self.catalog_reader = reader;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Share a range cache with the caller. Entries are evicted once a file
    /// has been hashed.
    #[must_use]
    pub fn with_range_cache(mut self, cache: Arc<HashRangeCache>) -> Self {
        self.range_cache = cache;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &PolicyModel {
        &self.policy
    }

    /// Evaluate every file in `request`.
    ///
    /// Per-file failures become verdicts. Errors are returned only for an
    /// empty file list, a catalog pool that cannot be created, or worker
    /// threads that cannot be started.
    pub fn run(&self, request: &SimulationRequest) -> SimulationResult<SimulationReport> {
        if request.files.is_empty() {
            return Err(SimulationError::NoValidFilesSelected);
        }

        let started = Instant::now();
        let mut report = SimulationReport::default();

        if self.policy.allow_all {
            log::info!("Policy allows all files; skipping per-file evaluation");
            report.record(Verdict::new(&self.policy.identity(), Decision::AllowAllRule));
            self.progress.report(100);
            self.progress.finish();
            return Ok(report);
        }

        let threads = request.threads.max(1);
        let total = request.files.len();
        log::info!("Simulating {total} file(s) on {threads} worker thread(s)");

        let catalogs = match &request.catalog_roots {
            Some(roots) => CatalogIndex::build(self.catalog_reader.as_ref(), roots, threads)?,
            None => CatalogIndex::empty(),
        };
        let hash_engine = HashEngine::from_config(Arc::clone(&self.hash_primitive), &self.config)
            .with_cache(Arc::clone(&self.range_cache));
        let extractor = SignerExtractor::new(Arc::clone(&self.trust_verifier));
        let unsigned_extensions = self.config.normalized_unsigned_extensions();
        let context = StageContext {
            policy: &self.policy,
            hash_engine: &hash_engine,
            extractor: &extractor,
            catalogs: &catalogs,
            unsigned_extensions: &unsigned_extensions,
        };

        self.progress.set_message("Evaluating files");
        let processed = Arc::new(AtomicUsize::new(0));
        let ticker = ProgressTicker::start(
            Arc::clone(&processed),
            total,
            Duration::from_millis(self.config.progress_interval_ms.max(1)),
            Arc::clone(&self.progress),
        )?;

        let chunk_size = total.div_ceil(threads);
        let shared_context = &context;
        let shared_report = &report;
        let shared_processed = processed.as_ref();
        let outcome = thread::scope(|scope| -> SimulationResult<()> {
            let mut workers = Vec::with_capacity(threads);
            for (index, chunk) in request.files.chunks(chunk_size).enumerate() {
                let worker = thread::Builder::new()
                    .name(format!("simulation-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        self.evaluate_chunk(shared_context, chunk, shared_report, shared_processed);
                    })
                    .map_err(|e| {
                        SimulationError::ThreadError(format!("Failed to start worker {index}: {e}"))
                    })?;
                workers.push(worker);
            }
            for worker in workers {
                if worker.join().is_err() {
                    return Err(SimulationError::ThreadError(
                        "Simulation worker terminated abnormally".to_string(),
                    ));
                }
            }
            Ok(())
        });

        ticker.stop();
        if let Err(e) = outcome {
            self.progress.finish_with_error(&e.to_string());
            return Err(e);
        }

        report.cancelled = self.cancellation.is_cancelled();
        self.progress.report(100);
        if report.cancelled {
            self.progress.finish_with_error("Simulation cancelled");
        } else {
            self.progress.finish();
        }
        log::info!(
            "Simulated {} of {total} file(s) in {:.1}s (range cache resolutions: {})",
            report.len(),
            started.elapsed().as_secs_f64(),
            hash_engine.cache().resolutions()
        );
        Ok(report)
    }

    fn evaluate_chunk(
        &self,
        context: &StageContext<'_>,
        chunk: &[PathBuf],
        report: &SimulationReport,
        processed: &AtomicUsize,
    ) {
        for path in chunk {
            if self.cancellation.is_cancelled() {
                log::debug!("Cancellation requested; stopping worker");
                break;
            }
            let candidate = CandidateFile::new(path.clone());
            let decision =
                panic::catch_unwind(AssertUnwindSafe(|| stages::evaluate(context, &candidate)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message(payload.as_ref());
                        log::warn!("Evaluation of {} panicked: {message}", path.display());
                        Decision::Signer(SignerDecision::Denied(DenialReason::Unexpected(message)))
                    });
            report.record(Verdict::new(path, decision));
            processed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during evaluation".to_string()
    }
}
