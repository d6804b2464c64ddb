use anyhow::{Context, Result};
use mdo_core::{DerivMode, MdoResult, Problem};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::driver::{DoeDriver, DoeOptions, DriverError, DRIVER_NAME};
use crate::generator::CaseGenerator;
use crate::manifest::{write_sweep_manifest, SweepManifest};
use crate::recorder::{CaseRecord, MemoryRecorder};
use crate::shard::WorkerComm;

/// How a sweep is spread over workers.
#[derive(Debug, Clone)]
pub struct SweepRunnerConfig {
    /// Number of ranks sharing the cases round robin.
    pub workers: usize,
    /// Threads in the pool; 0 picks the number of CPUs.
    pub threads: usize,
    /// Where to write the merged sweep manifest, if anywhere.
    pub manifest_path: Option<PathBuf>,
}

impl Default for SweepRunnerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            threads: 0,
            manifest_path: None,
        }
    }
}

/// Outcome of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub cases_run: usize,
    pub success: usize,
    pub failure: usize,
    /// Error that stopped the worker, with its causes.
    pub error: Option<String>,
}

/// Summary returned after the run so callers can report counts and the
/// manifest location.
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub generator: String,
    pub workers: Vec<WorkerReport>,
    /// Records from every worker, ordered by case index.
    pub records: Vec<CaseRecord>,
    pub manifest_path: Option<PathBuf>,
}

impl SweepSummary {
    pub fn success(&self) -> usize {
        self.workers.iter().map(|w| w.success).sum()
    }

    pub fn failure(&self) -> usize {
        self.workers.iter().map(|w| w.failure).sum()
    }

    /// True when some worker stopped early.
    pub fn terminated(&self) -> bool {
        self.workers.iter().any(|w| w.error.is_some())
    }

    pub fn manifest(&self) -> SweepManifest {
        SweepManifest::from_records(
            DRIVER_NAME,
            &self.generator,
            self.workers.len(),
            self.records.clone(),
        )
    }
}

/// Run a sweep on `workers` ranks of a rayon pool.
///
/// Each rank builds its own problem with `factory`, sets it up in forward
/// mode and runs a sharded [`DoeDriver`] over it. A rank that stops on an
/// unexpected failure does not affect the others; its error is kept in its
/// [`WorkerReport`].
pub fn run_sweep<P, F>(
    config: &SweepRunnerConfig,
    generator: Arc<dyn CaseGenerator>,
    factory: F,
) -> Result<SweepSummary>
where
    P: Problem,
    F: Fn(usize) -> MdoResult<P> + Sync,
{
    let workers = config.workers.max(1);
    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count.min(workers))
        .build()
        .context("building Rayon thread pool for sweep workers")?;

    info!(
        workers,
        threads = thread_count.min(workers),
        generator = generator.kind(),
        "running case sweep"
    );
    let results: Vec<(WorkerReport, Vec<CaseRecord>)> = pool.install(|| {
        (0..workers)
            .into_par_iter()
            .map(|rank| run_worker(rank, workers, &generator, &factory))
            .collect()
    });

    let mut reports = Vec::with_capacity(workers);
    let mut records = Vec::new();
    for (report, worker_records) in results {
        reports.push(report);
        records.extend(worker_records);
    }
    records.sort_by_key(|record| record.case_index);

    let mut summary = SweepSummary {
        generator: generator.kind().to_string(),
        workers: reports,
        records,
        manifest_path: None,
    };
    if let Some(path) = &config.manifest_path {
        write_sweep_manifest(path, &summary.manifest())?;
        summary.manifest_path = Some(path.clone());
    }
    info!(
        success = summary.success(),
        failure = summary.failure(),
        terminated = summary.terminated(),
        "case sweep finished"
    );
    Ok(summary)
}

fn run_worker<P, F>(
    rank: usize,
    workers: usize,
    generator: &Arc<dyn CaseGenerator>,
    factory: &F,
) -> (WorkerReport, Vec<CaseRecord>)
where
    P: Problem,
    F: Fn(usize) -> MdoResult<P> + Sync,
{
    let recorder = MemoryRecorder::new();
    let outcome = (|| -> Result<(), DriverError> {
        let comm = WorkerComm::new(rank, workers)?;
        let mut problem = factory(rank)?;
        problem.setup(DerivMode::Fwd)?;

        let mut driver = DoeDriver::new(Arc::clone(generator))
            .with_options(DoeOptions { run_parallel: true });
        driver.add_recorder(Box::new(recorder.clone()));
        driver.setup(Some(comm));
        driver.run(&mut problem)?;
        Ok(())
    })();

    let records = recorder.records();
    let success = records.iter().filter(|r| r.metadata.success).count();
    let error = outcome.err().map(|err| {
        let err = anyhow::Error::new(err);
        error!(rank, "sweep worker stopped: {err:#}");
        format!("{err:#}")
    });
    let report = WorkerReport {
        rank,
        cases_run: records.len(),
        success,
        failure: records.len() - success,
        error,
    };
    (report, records)
}
