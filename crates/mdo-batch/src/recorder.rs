//! Per-case recording.

use mdo_core::{MdoError, MdoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::case::CaseMetadata;
use crate::manifest::{write_sweep_manifest, SweepManifest};

/// What gets recorded for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub driver: String,
    pub rank: usize,
    pub iter_count: usize,
    /// Position of the case in the generator's full sequence.
    pub case_index: usize,
    pub metadata: CaseMetadata,
    /// Design variable and response values after the case ran.
    #[serde(default)]
    pub values: BTreeMap<String, Vec<f64>>,
}

pub trait CaseRecorder: Send {
    fn record_case(&mut self, record: &CaseRecord) -> MdoResult<()>;

    /// Called once after the last case of a run, whether or not it failed.
    fn finish(&mut self) -> MdoResult<()> {
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<CaseRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CaseRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CaseRecorder for MemoryRecorder {
    fn record_case(&mut self, record: &CaseRecord) -> MdoResult<()> {
        self.records
            .lock()
            .map_err(|_| MdoError::Other("case record storage is poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

/// Collects records and writes them as a [`SweepManifest`] when the run
/// finishes. The manifest's worker count is the number of distinct ranks
/// that recorded a case.
#[derive(Debug)]
pub struct JsonCaseRecorder {
    path: PathBuf,
    generator: String,
    records: Vec<CaseRecord>,
}

impl JsonCaseRecorder {
    pub fn new(path: impl Into<PathBuf>, generator: &str) -> Self {
        Self {
            path: path.into(),
            generator: generator.to_string(),
            records: Vec::new(),
        }
    }
}

impl CaseRecorder for JsonCaseRecorder {
    fn record_case(&mut self, record: &CaseRecord) -> MdoResult<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> MdoResult<()> {
        let driver = self
            .records
            .first()
            .map_or_else(|| crate::driver::DRIVER_NAME.to_string(), |r| r.driver.clone());
        let workers = self
            .records
            .iter()
            .map(|r| r.rank)
            .collect::<BTreeSet<_>>()
            .len()
            .max(1);
        let manifest =
            SweepManifest::from_records(&driver, &self.generator, workers, self.records.clone());
        write_sweep_manifest(&self.path, &manifest)?;
        Ok(())
    }
}

/// Recording acquired for the duration of one case.
///
/// The record is handed to every recorder when the scope is closed, or when
/// it is dropped without being closed.
pub struct RecordingScope<'r> {
    recorders: &'r mut [Box<dyn CaseRecorder>],
    record: CaseRecord,
    closed: bool,
}

impl<'r> RecordingScope<'r> {
    pub fn open(
        recorders: &'r mut [Box<dyn CaseRecorder>],
        rank: usize,
        iter_count: usize,
        case_index: usize,
        metadata: CaseMetadata,
    ) -> Self {
        Self {
            recorders,
            record: CaseRecord {
                driver: metadata.source.clone(),
                rank,
                iter_count,
                case_index,
                metadata,
                values: BTreeMap::new(),
            },
            closed: false,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut CaseMetadata {
        &mut self.record.metadata
    }

    pub fn set_values(&mut self, values: BTreeMap<String, Vec<f64>>) {
        self.record.values = values;
    }

    /// Record the case with every recorder and return its final metadata.
    ///
    /// A failing recorder does not stop the ones after it; the first error is
    /// returned once all of them have run.
    pub fn close(mut self) -> MdoResult<CaseMetadata> {
        self.closed = true;
        let mut first_err = None;
        for recorder in self.recorders.iter_mut() {
            if let Err(err) = recorder.record_case(&self.record) {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(self.record.metadata.clone()),
        }
    }
}

impl Drop for RecordingScope<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        for recorder in self.recorders.iter_mut() {
            if let Err(err) = recorder.record_case(&self.record) {
                warn!(iter_count = self.record.iter_count, "failed to record case: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::load_sweep_manifest;
    use tempfile::tempdir;

    #[test]
    fn closed_scope_records_once() {
        let memory = MemoryRecorder::new();
        let mut recorders: Vec<Box<dyn CaseRecorder>> = vec![Box::new(memory.clone())];
        let mut scope = RecordingScope::open(
            &mut recorders,
            0,
            2,
            5,
            CaseMetadata::new("DOEDriver", 2),
        );
        scope.metadata_mut().success = false;
        let metadata = scope.close().unwrap();
        assert!(!metadata.success);

        let records = memory.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].case_index, 5);
        assert!(!records[0].metadata.success);
    }

    struct RejectingRecorder {
        message: &'static str,
    }

    impl CaseRecorder for RejectingRecorder {
        fn record_case(&mut self, _record: &CaseRecord) -> MdoResult<()> {
            Err(MdoError::Other(self.message.into()))
        }
    }

    #[test]
    fn close_reaches_every_recorder_and_reports_the_first_error() {
        let memory = MemoryRecorder::new();
        let mut recorders: Vec<Box<dyn CaseRecorder>> = vec![
            Box::new(RejectingRecorder { message: "disk full" }),
            Box::new(RejectingRecorder { message: "second" }),
            Box::new(memory.clone()),
        ];
        let scope =
            RecordingScope::open(&mut recorders, 1, 3, 7, CaseMetadata::new("DOEDriver", 3));
        match scope.close() {
            Err(MdoError::Other(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("expected the first recorder's error, got {other:?}"),
        }

        let records = memory.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].case_index, 7);
    }

    #[test]
    fn dropped_scope_still_records() {
        let memory = MemoryRecorder::new();
        let mut recorders: Vec<Box<dyn CaseRecorder>> = vec![Box::new(memory.clone())];
        {
            let _scope =
                RecordingScope::open(&mut recorders, 0, 0, 0, CaseMetadata::new("DOEDriver", 0));
        }
        assert_eq!(memory.records().len(), 1);
    }

    #[test]
    fn json_recorder_writes_a_manifest_on_finish() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cases.json");
        let mut recorder = JsonCaseRecorder::new(&path, "list");
        let record = CaseRecord {
            driver: "DOEDriver".into(),
            rank: 0,
            iter_count: 0,
            case_index: 0,
            metadata: CaseMetadata::new("DOEDriver", 0),
            values: BTreeMap::new(),
        };
        recorder.record_case(&record).unwrap();
        recorder
            .record_case(&CaseRecord {
                rank: 1,
                case_index: 1,
                ..record.clone()
            })
            .unwrap();
        recorder.finish().unwrap();

        let manifest = load_sweep_manifest(&path).unwrap();
        assert_eq!(manifest.generator, "list");
        assert_eq!(manifest.num_cases, 2);
        assert_eq!(manifest.success, 2);
        assert_eq!(manifest.workers, 2);
    }

    #[test]
    fn json_recorder_without_cases_reports_one_worker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.json");
        let mut recorder = JsonCaseRecorder::new(&path, "list");
        recorder.finish().unwrap();
        assert_eq!(load_sweep_manifest(&path).unwrap().workers, 1);
    }
}
