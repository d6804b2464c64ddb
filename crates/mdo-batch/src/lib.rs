//! # mdo-batch: Design-of-Experiments Sweeps
//!
//! Runs a problem once per generated case, records every outcome, and keeps
//! going past per-case analysis failures. Sweeps can be split round robin
//! over several workers with [`run_sweep`].

pub mod case;
pub mod driver;
pub mod generator;
pub mod manifest;
pub mod recorder;
pub mod runner;
pub mod shard;

pub use case::{Case, CaseMetadata};
pub use driver::{DoeDriver, DoeOptions, DriverError, DRIVER_NAME};
pub use generator::{
    load_generator_config, CaseGenerator, CaseValue, FullFactorialGenerator, GeneratorConfig,
    GeneratorSpec, ListGenerator, UniformGenerator,
};
pub use manifest::{load_sweep_manifest, write_sweep_manifest, SweepManifest};
pub use recorder::{CaseRecord, CaseRecorder, JsonCaseRecorder, MemoryRecorder, RecordingScope};
pub use runner::{run_sweep, SweepRunnerConfig, SweepSummary, WorkerReport};
pub use shard::{shard, ShardedCases, WorkerComm};
