//! Boolean sparsity structure of the total jacobian.
//!
//! The structure is computed by probing: every partial is replaced with
//! random values (see [`SparsityProbe`]), totals are computed `repeats` times
//! and their magnitudes accumulated, and the accumulated matrix is normalized
//! by its Frobenius norm and thresholded.

use mdo_core::{
    offset_ranges, DerivMode, MdoError, MdoResult, Problem, ResponseMeta, VarRange,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use super::probe::{ProbeScope, SparsityProbe};

/// Settings for a coloring run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColoringOptions {
    pub mode: DerivMode,
    /// Number of probed total-jacobian evaluations to accumulate.
    pub repeats: usize,
    /// Normalized magnitude at or below which an entry is a structural zero.
    pub tol: f64,
    /// Seed for the probe values; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for ColoringOptions {
    fn default() -> Self {
        Self {
            mode: DerivMode::Fwd,
            repeats: 1,
            tol: 1e-30,
            seed: None,
        }
    }
}

impl ColoringOptions {
    pub fn validate(&self) -> MdoResult<()> {
        if self.mode == DerivMode::Rev {
            return Err(MdoError::Config(
                "reverse mode is not supported for simultaneous derivatives".into(),
            ));
        }
        if self.repeats == 0 {
            return Err(MdoError::Config(
                "at least one total jacobian evaluation is required (repeats >= 1)".into(),
            ));
        }
        if !(self.tol.is_finite() && self.tol >= 0.0) {
            return Err(MdoError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Column-major boolean matrix: entry `(r, c)` is set when row `r` of the
/// total jacobian structurally depends on column `c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralJacobian {
    nrows: usize,
    ncols: usize,
    data: Vec<bool>,
}

impl StructuralJacobian {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![false; nrows * ncols],
        }
    }

    /// Build from row-major rows of equal length.
    pub fn from_pattern(rows: &[Vec<bool>]) -> MdoResult<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != ncols) {
            return Err(MdoError::Validation(
                "structural jacobian rows must all have the same length".into(),
            ));
        }
        let mut jac = Self::new(rows.len(), ncols);
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                jac.set(r, c, value);
            }
        }
        Ok(jac)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.data[col * self.nrows + row]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.data[col * self.nrows + row] = value;
    }

    pub fn column(&self, col: usize) -> &[bool] {
        &self.data[col * self.nrows..(col + 1) * self.nrows]
    }

    /// Rows that depend on `col`, ascending.
    pub fn column_rows(&self, col: usize) -> Vec<usize> {
        self.column(col)
            .iter()
            .enumerate()
            .filter_map(|(row, &set)| set.then_some(row))
            .collect()
    }

    /// True when no row depends on both columns.
    pub fn columns_disjoint(&self, a: usize, b: usize) -> bool {
        !self
            .column(a)
            .iter()
            .zip(self.column(b))
            .any(|(&x, &y)| x && y)
    }

    pub fn nnz(&self) -> usize {
        self.data.iter().filter(|&&set| set).count()
    }
}

/// One line per row, `x` for a dependency and `.` otherwise.
impl fmt::Display for StructuralJacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.nrows {
            let line: String = (0..self.ncols)
                .map(|col| if self.get(row, col) { 'x' } else { '.' })
                .collect();
            writeln!(f, "{line} {row}")?;
        }
        Ok(())
    }
}

/// A structural jacobian together with the variable layout of its rows and
/// columns.
#[derive(Debug, Clone)]
pub struct SparsityStructure {
    pub jac: StructuralJacobian,
    /// Column ranges, one per design variable in declaration order.
    pub dv_ranges: Vec<VarRange>,
    /// Row ranges, objectives first and then nonlinear constraints.
    pub res_ranges: Vec<VarRange>,
}

impl SparsityStructure {
    /// Assemble a structure from a known pattern, laying out variables back
    /// to back in the given order.
    pub fn from_parts(
        jac: StructuralJacobian,
        dvs: &[(&str, usize)],
        responses: &[(&str, usize)],
    ) -> MdoResult<Self> {
        let dv_ranges = offset_ranges(dvs.iter().copied());
        let res_ranges = offset_ranges(responses.iter().copied());
        let ncols = dv_ranges.last().map_or(0, |r| r.end + 1);
        let nrows = res_ranges.last().map_or(0, |r| r.end + 1);
        if (nrows, ncols) != (jac.nrows(), jac.ncols()) {
            return Err(MdoError::Validation(format!(
                "structural jacobian is {}x{} but the variables span {}x{}",
                jac.nrows(),
                jac.ncols(),
                nrows,
                ncols
            )));
        }
        Ok(Self {
            jac,
            dv_ranges,
            res_ranges,
        })
    }
}

/// Responses that take part in the structure analysis: every objective,
/// then every nonlinear constraint, each in declaration order.
pub fn sparsity_responses(responses: &[ResponseMeta]) -> Vec<&ResponseMeta> {
    responses
        .iter()
        .filter(|res| res.is_objective())
        .chain(
            responses
                .iter()
                .filter(|res| !res.is_objective() && !res.is_linear()),
        )
        .collect()
}

/// Probe the problem and compute the structural jacobian of its objectives
/// and nonlinear constraints with respect to every design variable.
///
/// Any stored coloring is cleared on entry and on exit, and the probe is
/// removed from the model's jacobians before returning, whether or not the
/// analysis succeeded.
pub fn compute_structure(
    problem: &mut dyn Problem,
    options: &ColoringOptions,
) -> MdoResult<SparsityStructure> {
    options.validate()?;

    let dvs: Vec<(String, usize)> = problem
        .design_vars()
        .iter()
        .map(|dv| (dv.name.clone(), dv.size))
        .collect();
    let responses: Vec<(String, usize)> = sparsity_responses(problem.responses())
        .into_iter()
        .map(|res| (res.name.clone(), res.size))
        .collect();
    if dvs.is_empty() || responses.is_empty() {
        return Err(MdoError::Config(
            "sparsity structure cannot be computed without design variables and responses"
                .into(),
        ));
    }

    let of: Vec<String> = responses.iter().map(|(name, _)| name.clone()).collect();
    let wrt: Vec<String> = dvs.iter().map(|(name, _)| name.clone()).collect();

    problem.set_simul_coloring(None);
    let accumulated = accumulate_probed_totals(problem, options, &of, &wrt);
    problem.set_simul_coloring(None);
    let accumulated = accumulated?;

    let jac = threshold(&accumulated, options.tol)?;
    info!(
        rows = jac.nrows(),
        cols = jac.ncols(),
        nonzeros = jac.nnz(),
        "computed jacobian sparsity structure"
    );
    debug!("structural jacobian:\n{jac}");

    let dvs: Vec<(&str, usize)> = dvs.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    let responses: Vec<(&str, usize)> =
        responses.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    SparsityStructure::from_parts(jac, &dvs, &responses)
}

fn accumulate_probed_totals(
    problem: &mut dyn Problem,
    options: &ColoringOptions,
    of: &[String],
    wrt: &[String],
) -> MdoResult<Vec<Vec<f64>>> {
    let probe = SparsityProbe::new(options.tol, options.seed);
    let _scope = ProbeScope::install(problem.model(), &probe);

    problem.setup(options.mode)?;
    if problem.run_model()? {
        warn!("model did not converge while probing the sparsity structure");
    }

    let mut accumulated: Vec<Vec<f64>> = Vec::new();
    for pass in 0..options.repeats {
        let totals = problem.compute_totals(of, wrt)?;
        if pass == 0 {
            accumulated = totals
                .iter()
                .map(|row| row.iter().map(|v| v.abs()).collect())
                .collect();
            continue;
        }
        for (acc_row, row) in accumulated.iter_mut().zip(&totals) {
            for (acc, value) in acc_row.iter_mut().zip(row) {
                *acc += value.abs();
            }
        }
    }
    Ok(accumulated)
}

/// Normalize by the Frobenius norm and keep entries strictly above `tol`.
fn threshold(values: &[Vec<f64>], tol: f64) -> MdoResult<StructuralJacobian> {
    let nrows = values.len();
    let ncols = values.first().map_or(0, Vec::len);
    if values.iter().any(|row| row.len() != ncols) {
        return Err(MdoError::Validation(
            "total jacobian rows must all have the same length".into(),
        ));
    }

    let mut jac = StructuralJacobian::new(nrows, ncols);
    let norm = values
        .iter()
        .flatten()
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        warn!(norm, "total jacobian has no usable nonzero entries");
        return Ok(jac);
    }
    for (r, row) in values.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value / norm > tol {
                jac.set(r, c, true);
            }
        }
    }
    Ok(jac)
}
