//! Design-of-experiments driver.
//!
//! The driver pulls cases from its generator and, for each one, sets the
//! design variables, runs the model inside a recording scope, and records
//! what happened:
//!
//! | Model outcome | `success` | `terminate` | Sweep |
//! |---------------|-----------|-------------|-------|
//! | converged | true | false | continues |
//! | did not converge | false | false | continues |
//! | [`MdoError::Analysis`] | false | false | continues, message kept |
//! | any other error | false | true | stops after recording, error returned |
//!
//! With `run_parallel` set and a [`WorkerComm`] given at setup, the driver
//! runs only the cases its rank owns.

use mdo_core::{MdoError, MdoResult, Problem};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::case::{Case, CaseMetadata};
use crate::generator::{CaseGenerator, GeneratorConfig};
use crate::recorder::{CaseRecorder, RecordingScope};
use crate::shard::{shard, WorkerComm};

pub const DRIVER_NAME: &str = "DOEDriver";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoeOptions {
    /// Run only this worker's share of the cases.
    pub run_parallel: bool,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Core(#[from] MdoError),

    #[error("case {case_index} (iteration {iter_count}) failed")]
    CaseFailed {
        iter_count: usize,
        case_index: usize,
        #[source]
        source: MdoError,
    },

    #[error("recording iteration {iter_count} failed")]
    Recording {
        iter_count: usize,
        #[source]
        source: MdoError,
    },
}

pub struct DoeDriver {
    generator: Arc<dyn CaseGenerator>,
    options: DoeOptions,
    comm: Option<WorkerComm>,
    recorders: Vec<Box<dyn CaseRecorder>>,
    iter_count: usize,
}

impl DoeDriver {
    pub fn new(generator: Arc<dyn CaseGenerator>) -> Self {
        Self {
            generator,
            options: DoeOptions::default(),
            comm: None,
            recorders: Vec::new(),
            iter_count: 0,
        }
    }

    /// Build the generator from its configuration. A bare generator kind is
    /// a configuration error.
    pub fn from_config(config: &GeneratorConfig) -> MdoResult<Self> {
        Ok(Self::new(config.build()?))
    }

    pub fn with_options(mut self, options: DoeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_recorder(&mut self, recorder: Box<dyn CaseRecorder>) {
        self.recorders.push(recorder);
    }

    pub fn options(&self) -> DoeOptions {
        self.options
    }

    pub fn generator(&self) -> &dyn CaseGenerator {
        self.generator.as_ref()
    }

    /// Cases run by the last (or current) call to [`DoeDriver::run`].
    pub fn iter_count(&self) -> usize {
        self.iter_count
    }

    /// Worker layout in effect; `None` unless `run_parallel` is set.
    pub fn comm(&self) -> Option<WorkerComm> {
        self.comm
    }

    pub fn setup(&mut self, comm: Option<WorkerComm>) {
        self.comm = if self.options.run_parallel { comm } else { None };
    }

    /// Run every case this worker owns.
    ///
    /// Returns the failure flag, which is always `false`: per-case failures
    /// are recorded rather than reported, and an unexpected failure ends the
    /// run with [`DriverError::CaseFailed`] after the case is recorded.
    /// Recorders are finished in either case.
    pub fn run(&mut self, problem: &mut dyn Problem) -> Result<bool, DriverError> {
        let outcome = self.run_cases(problem);
        let mut finished = Ok(());
        for recorder in self.recorders.iter_mut() {
            if let Err(err) = recorder.finish() {
                warn!("failed to finish case recorder: {err}");
                finished = Err(DriverError::Recording {
                    iter_count: self.iter_count,
                    source: err,
                });
            }
        }
        outcome?;
        finished?;
        Ok(false)
    }

    fn run_cases(&mut self, problem: &mut dyn Problem) -> Result<(), DriverError> {
        self.iter_count = 0;
        let generator = Arc::clone(&self.generator);
        let design_vars = problem.design_vars().to_vec();
        let cases = generator.generate(&design_vars)?;
        let cases: Box<dyn Iterator<Item = (usize, Case)> + '_> = match self.comm {
            Some(comm) => Box::new(shard(cases, comm)),
            None => Box::new(cases.enumerate()),
        };

        let comm = self.comm.unwrap_or_else(WorkerComm::serial);
        info!(
            generator = generator.kind(),
            rank = comm.rank,
            workers = comm.size,
            "starting design-of-experiments sweep"
        );
        for (case_index, case) in cases {
            debug!(rank = comm.rank, case_index, "running case");
            let metadata = self.prep_case(problem, &case, self.iter_count)?;
            self.try_case(problem, metadata, case_index)?;
            self.iter_count += 1;
        }
        info!(rank = comm.rank, cases = self.iter_count, "sweep finished");
        Ok(())
    }

    /// Fresh metadata at coordinate `(iter_count,)`, with the case's values
    /// applied to the design variables.
    pub fn prep_case(
        &self,
        problem: &mut dyn Problem,
        case: &Case,
        iter_count: usize,
    ) -> MdoResult<CaseMetadata> {
        let metadata = CaseMetadata::new(DRIVER_NAME, iter_count);
        for (name, value) in case {
            problem.set_design_var(name, value)?;
        }
        Ok(metadata)
    }

    /// Run the model once inside a recording scope and return the recorded
    /// metadata.
    pub fn try_case(
        &mut self,
        problem: &mut dyn Problem,
        metadata: CaseMetadata,
        case_index: usize,
    ) -> Result<CaseMetadata, DriverError> {
        let iter_count = self.iter_count;
        let rank = self.comm.map_or(0, |comm| comm.rank);
        let mut scope =
            RecordingScope::open(&mut self.recorders, rank, iter_count, case_index, metadata);
        scope.metadata_mut().terminate = false;

        let mut failure = None;
        match problem.run_model() {
            Ok(failed) => scope.metadata_mut().success = !failed,
            Err(err) if err.is_recoverable() => {
                warn!(case_index, "case failed: {err}");
                let meta = scope.metadata_mut();
                meta.success = false;
                meta.msg = err.to_string();
            }
            Err(err) => {
                error!(case_index, "case failed unexpectedly, stopping: {err}");
                let meta = scope.metadata_mut();
                meta.success = false;
                meta.terminate = true;
                meta.msg = err.to_string();
                failure = Some(err);
            }
        }
        scope.set_values(problem.values());
        let recorded = scope.close();

        if let Some(source) = failure {
            return Err(DriverError::CaseFailed {
                iter_count,
                case_index,
                source,
            });
        }
        recorded.map_err(|source| DriverError::Recording { iter_count, source })
    }
}
