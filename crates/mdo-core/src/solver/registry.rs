use super::backend::{FullPivLuSolver, LinearSystemBackend, LuSolver};
use crate::error::MdoError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Registry of the available linear-system backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    #[default]
    Lu,
    FullLu,
}

impl FromStr for SolverKind {
    type Err = MdoError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "lu" | "default" => Ok(SolverKind::Lu),
            "full-lu" | "full_lu" => Ok(SolverKind::FullLu),
            other => Err(MdoError::Config(format!(
                "unknown solver '{}'; supported values: {}",
                other,
                SolverKind::available().join(", ")
            ))),
        }
    }
}

impl SolverKind {
    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            SolverKind::Lu => Arc::new(LuSolver),
            SolverKind::FullLu => Arc::new(FullPivLuSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["lu", "full-lu"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::Lu => "lu",
            SolverKind::FullLu => "full-lu",
        }
    }
}
