//! The total-derivative provider abstraction.
//!
//! Both the coloring algorithms and the case-sweep driver operate on a
//! [`Problem`]: a model tree with declared design variables and responses that
//! can be set up, solved, and differentiated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::coloring::SimulColoring;
use crate::error::{MdoError, MdoResult};
use crate::system::System;
use crate::vars::{DesignVarMeta, ResponseMeta};

/// Direction in which total derivatives are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivMode {
    /// One linear solve per design-variable column.
    #[default]
    Fwd,
    /// One linear solve per response row.
    Rev,
}

impl DerivMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivMode::Fwd => "fwd",
            DerivMode::Rev => "rev",
        }
    }
}

impl FromStr for DerivMode {
    type Err = MdoError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "fwd" | "forward" => Ok(DerivMode::Fwd),
            "rev" | "reverse" => Ok(DerivMode::Rev),
            other => Err(MdoError::Config(format!(
                "unknown derivative mode '{other}'; supported values: fwd, rev"
            ))),
        }
    }
}

impl fmt::Display for DerivMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured model with declared design variables and responses.
///
/// Total jacobians are row-major: one row per flattened response entry (in
/// `of` order) and one column per flattened design-variable entry (in `wrt`
/// order).
pub trait Problem {
    /// Root of the model tree.
    fn model(&self) -> &dyn System;

    /// Design variables in declaration order.
    fn design_vars(&self) -> &[DesignVarMeta];

    /// Objectives and constraints in declaration order.
    fn responses(&self) -> &[ResponseMeta];

    /// Derivative mode chosen at the last setup.
    fn mode(&self) -> DerivMode;

    /// (Re)build the model for the given derivative mode.
    fn setup(&mut self, mode: DerivMode) -> MdoResult<()>;

    /// Run a full nonlinear solve of the model.
    ///
    /// Returns `Ok(true)` when the solve finished without converging. Known
    /// analysis failures are reported as [`MdoError::Analysis`].
    fn run_model(&mut self) -> MdoResult<bool>;

    /// Total derivatives of `of` with respect to `wrt`.
    fn compute_totals(&mut self, of: &[String], wrt: &[String]) -> MdoResult<Vec<Vec<f64>>>;

    /// Set the value of a design variable. A single value is broadcast to
    /// every entry.
    fn set_design_var(&mut self, name: &str, value: &[f64]) -> MdoResult<()>;

    /// Current design variable and response values.
    fn values(&self) -> BTreeMap<String, Vec<f64>>;

    /// Coloring used to compute totals, if any.
    fn simul_coloring(&self) -> Option<&SimulColoring>;

    fn set_simul_coloring(&mut self, coloring: Option<SimulColoring>);

    fn design_var(&self, name: &str) -> Option<&DesignVarMeta> {
        self.design_vars().iter().find(|dv| dv.name == name)
    }

    fn response(&self, name: &str) -> Option<&ResponseMeta> {
        self.responses().iter().find(|res| res.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deriv_mode_parsing_accepts_long_and_short_names() {
        assert_eq!("fwd".parse::<DerivMode>().unwrap(), DerivMode::Fwd);
        assert_eq!("Forward".parse::<DerivMode>().unwrap(), DerivMode::Fwd);
        assert_eq!("rev".parse::<DerivMode>().unwrap(), DerivMode::Rev);
        assert!(matches!(
            "sideways".parse::<DerivMode>(),
            Err(MdoError::Config(_))
        ));
    }

    #[test]
    fn deriv_mode_defaults_to_forward() {
        assert_eq!(DerivMode::default(), DerivMode::Fwd);
        assert_eq!(DerivMode::Rev.to_string(), "rev");
    }
}
