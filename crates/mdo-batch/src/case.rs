use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One set of design variable values, as `(name, value)` pairs applied in
/// order.
pub type Case = Vec<(String, Vec<f64>)>;

/// Outcome of running one case. Created fresh for every case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseMetadata {
    /// Name of the driver that ran the case.
    pub source: String,
    /// Iteration coordinate, `(iter_count,)`.
    pub coord: Vec<usize>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Failure message; empty when the case succeeded.
    #[serde(default)]
    pub msg: String,
    /// Set when the failure stops the worker that ran the case.
    #[serde(default)]
    pub terminate: bool,
}

impl CaseMetadata {
    pub fn new(source: &str, iter_count: usize) -> Self {
        Self {
            source: source.to_string(),
            coord: vec![iter_count],
            timestamp: Utc::now(),
            success: true,
            msg: String::new(),
            terminate: false,
        }
    }

    pub fn iter_count(&self) -> usize {
        self.coord.first().copied().unwrap_or_default()
    }
}
