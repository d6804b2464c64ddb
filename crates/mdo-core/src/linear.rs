//! # Linear reference model
//!
//! [`LinearProblem`] is a complete total-derivative provider for models whose
//! equations are linear:
//!
//! ```text
//! R(u, x) = A u - B x = 0        (implicit state, optional)
//!       f = C u + D x            (responses)
//!
//! df/dx = D + C A⁻¹ B
//! ```
//!
//! Partials are declared per `(of, wrt)` block in dense, sparse or list form,
//! where `of` is a response name or `"state"` and `wrt` is a design variable
//! name or `"state"`. The model tree is a root group with two components,
//! `model.state` (the `A`/`B` blocks) and `model.outputs` (the `C`/`D`
//! blocks). With `assembled: true` every system shares the root jacobian.
//!
//! Partials are pushed into the jacobians through `set_abs` on every
//! linearization, so an installed override sees them each time totals are
//! computed.
//!
//! ## Colored totals
//!
//! When a [`SimulColoring`] is attached and the mode is forward, columns that
//! share a color are seeded together and solved once; the result is scattered
//! back through the coloring's response maps.
//!
//! ## File format
//!
//! ```json
//! {
//!   "design_vars": [{"name": "x", "size": 2, "lower": -1.0, "upper": 1.0}],
//!   "responses": [{"name": "f", "size": 2, "kind": {"type": "objective"}}],
//!   "state_size": 0,
//!   "partials": [
//!     {"of": "f", "wrt": "x", "form": "list", "rows": [0, 1], "cols": [0, 1], "data": [1.0, 2.0]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::coloring::SimulColoring;
use crate::error::{MdoError, MdoResult};
use crate::jacobian::{subjac_key, Jacobian, SharedJacobian, SubJac, SubjacKey};
use crate::problem::{DerivMode, Problem};
use crate::solver::{Factorization, LinearSystemBackend, SolverKind};
use crate::system::System;
use crate::vars::{offset_ranges, DesignVarMeta, ResponseMeta, VarRange};

/// Name of the implicit state vector in partial declarations.
pub const STATE: &str = "state";

/// Serialized description of a [`LinearProblem`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProblemSpec {
    pub design_vars: Vec<DesignVarMeta>,
    pub responses: Vec<ResponseMeta>,
    #[serde(default)]
    pub state_size: usize,
    #[serde(default)]
    pub partials: Vec<PartialSpec>,
    #[serde(default)]
    pub assembled: bool,
    #[serde(default)]
    pub solver: SolverKind,
}

/// One declared block of partial derivatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialSpec {
    pub of: String,
    pub wrt: String,
    #[serde(flatten)]
    pub value: PartialValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "lowercase")]
pub enum PartialValue {
    Dense {
        value: Vec<Vec<f64>>,
    },
    Sparse {
        rows: Vec<usize>,
        cols: Vec<usize>,
        data: Vec<f64>,
    },
    List {
        rows: Vec<usize>,
        cols: Vec<usize>,
        data: Vec<f64>,
    },
}

impl PartialSpec {
    pub fn dense(of: &str, wrt: &str, value: Vec<Vec<f64>>) -> Self {
        Self {
            of: of.into(),
            wrt: wrt.into(),
            value: PartialValue::Dense { value },
        }
    }

    pub fn sparse(of: &str, wrt: &str, rows: Vec<usize>, cols: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            of: of.into(),
            wrt: wrt.into(),
            value: PartialValue::Sparse { rows, cols, data },
        }
    }

    pub fn list(of: &str, wrt: &str, rows: Vec<usize>, cols: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            of: of.into(),
            wrt: wrt.into(),
            value: PartialValue::List { rows, cols, data },
        }
    }

    fn build(&self, shape: (usize, usize)) -> MdoResult<SubJac> {
        let sub = match &self.value {
            PartialValue::Dense { value } => SubJac::dense(value)?,
            PartialValue::Sparse { rows, cols, data } => SubJac::sparse(rows, cols, data, shape)?,
            PartialValue::List { rows, cols, data } => {
                SubJac::list(rows.clone(), cols.clone(), data.clone(), shape)?
            }
        };
        if sub.shape() != shape {
            return Err(MdoError::Validation(format!(
                "partial ('{}', '{}') has shape {:?}, expected {:?}",
                self.of,
                self.wrt,
                sub.shape(),
                shape
            )));
        }
        Ok(sub)
    }
}

pub fn load_problem_spec(path: &Path) -> MdoResult<LinearProblemSpec> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|err| MdoError::Parse(format!("model file '{}': {err}", path.display())))
}

struct Component {
    pathname: String,
    jacobian: SharedJacobian,
    partials: Vec<(SubjacKey, SubJac)>,
}

impl System for Component {
    fn pathname(&self) -> &str {
        &self.pathname
    }

    fn jacobian(&self) -> SharedJacobian {
        self.jacobian.clone()
    }
}

struct Group {
    pathname: String,
    jacobian: SharedJacobian,
    children: Vec<Component>,
}

impl System for Group {
    fn pathname(&self) -> &str {
        &self.pathname
    }

    fn jacobian(&self) -> SharedJacobian {
        self.jacobian.clone()
    }

    fn subsystems(&self) -> Vec<&dyn System> {
        self.children.iter().map(|c| c as &dyn System).collect()
    }
}

/// Dense operator blocks for one `(of, wrt)` selection.
struct Blocks {
    a: Vec<Vec<f64>>,
    b: Vec<Vec<f64>>,
    c: Vec<Vec<f64>>,
    d: Vec<Vec<f64>>,
}

/// Linear model implementing [`Problem`].
pub struct LinearProblem {
    design_vars: Vec<DesignVarMeta>,
    responses: Vec<ResponseMeta>,
    state_size: usize,
    model: Group,
    backend: Arc<dyn LinearSystemBackend>,
    mode: DerivMode,
    is_setup: bool,
    inputs: BTreeMap<String, Vec<f64>>,
    outputs: BTreeMap<String, Vec<f64>>,
    state: Vec<f64>,
    coloring: Option<SimulColoring>,
}

impl LinearProblem {
    pub fn from_spec(spec: LinearProblemSpec) -> MdoResult<Self> {
        let mut names = HashSet::new();
        for (name, size) in spec
            .design_vars
            .iter()
            .map(|dv| (&dv.name, dv.size))
            .chain(spec.responses.iter().map(|res| (&res.name, res.size)))
        {
            if name == STATE {
                return Err(MdoError::Validation(format!(
                    "'{STATE}' is reserved for the implicit state vector"
                )));
            }
            if size == 0 {
                return Err(MdoError::Validation(format!(
                    "variable '{name}' must have a positive size"
                )));
            }
            if !names.insert(name.clone()) {
                return Err(MdoError::Validation(format!(
                    "variable '{name}' is declared more than once"
                )));
            }
        }

        let size_of = |name: &str| -> Option<usize> {
            if name == STATE {
                return (spec.state_size > 0).then_some(spec.state_size);
            }
            spec.design_vars
                .iter()
                .find(|dv| dv.name == name)
                .map(|dv| dv.size)
                .or_else(|| {
                    spec.responses
                        .iter()
                        .find(|res| res.name == name)
                        .map(|res| res.size)
                })
        };
        let is_dv = |name: &str| spec.design_vars.iter().any(|dv| dv.name == name);
        let is_response = |name: &str| spec.responses.iter().any(|res| res.name == name);

        let mut state_partials = Vec::new();
        let mut output_partials = Vec::new();
        let mut seen = HashSet::new();
        for partial in &spec.partials {
            let of_ok = partial.of == STATE || is_response(&partial.of);
            let wrt_ok = partial.wrt == STATE || is_dv(&partial.wrt);
            if !of_ok || !wrt_ok {
                return Err(MdoError::Validation(format!(
                    "partial ('{}', '{}') must be of a response or '{STATE}' \
                     with respect to a design variable or '{STATE}'",
                    partial.of, partial.wrt
                )));
            }
            let (Some(rows), Some(cols)) = (size_of(&partial.of), size_of(&partial.wrt)) else {
                return Err(MdoError::Validation(format!(
                    "partial ('{}', '{}') refers to the state but state_size is 0",
                    partial.of, partial.wrt
                )));
            };
            let key = subjac_key(&partial.of, &partial.wrt);
            if !seen.insert(key.clone()) {
                return Err(MdoError::Validation(format!(
                    "partial ('{}', '{}') is declared more than once",
                    partial.of, partial.wrt
                )));
            }
            let sub = partial.build((rows, cols))?;
            if partial.of == STATE {
                state_partials.push((key, sub));
            } else {
                output_partials.push((key, sub));
            }
        }
        if spec.state_size > 0 && !seen.contains(&subjac_key(STATE, STATE)) {
            return Err(MdoError::Validation(format!(
                "partial ('{STATE}', '{STATE}') is required when state_size is positive"
            )));
        }

        let root_jac = Jacobian::new().into_shared();
        let component_jac = || {
            if spec.assembled {
                root_jac.clone()
            } else {
                Jacobian::new().into_shared()
            }
        };
        let mut children = Vec::new();
        if spec.state_size > 0 {
            children.push(Component {
                pathname: "model.state".into(),
                jacobian: component_jac(),
                partials: state_partials,
            });
        }
        children.push(Component {
            pathname: "model.outputs".into(),
            jacobian: component_jac(),
            partials: output_partials,
        });

        let inputs = spec
            .design_vars
            .iter()
            .map(|dv| (dv.name.clone(), vec![0.0; dv.size]))
            .collect();

        Ok(Self {
            state_size: spec.state_size,
            backend: spec.solver.build_solver(),
            model: Group {
                pathname: "model".into(),
                jacobian: root_jac,
                children,
            },
            design_vars: spec.design_vars,
            responses: spec.responses,
            mode: DerivMode::Fwd,
            is_setup: false,
            inputs,
            outputs: BTreeMap::new(),
            state: Vec::new(),
            coloring: None,
        })
    }

    pub fn from_path(path: &Path) -> MdoResult<Self> {
        Self::from_spec(load_problem_spec(path)?)
    }

    pub fn with_backend(mut self, backend: Arc<dyn LinearSystemBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    fn ensure_setup(&self) -> MdoResult<()> {
        if !self.is_setup {
            return Err(MdoError::Config(
                "problem must be set up before the model is run".into(),
            ));
        }
        Ok(())
    }

    /// Push every declared partial through its jacobian's `set_abs`.
    fn linearize(&self) {
        for comp in &self.model.children {
            let mut jac = comp.jacobian.borrow_mut();
            for (key, sub) in &comp.partials {
                jac.set_abs(key.clone(), sub.clone());
            }
        }
    }

    fn block(&self, of: &str, wrt: &str) -> Option<Vec<Vec<f64>>> {
        self.model
            .children
            .iter()
            .find_map(|comp| comp.jacobian.borrow().get(of, wrt).map(SubJac::to_dense))
    }

    fn response_ranges(&self, of: &[String]) -> MdoResult<Vec<VarRange>> {
        let mut sized = Vec::with_capacity(of.len());
        for name in of {
            let res = self.response(name).ok_or_else(|| {
                MdoError::Validation(format!("unknown response '{name}'"))
            })?;
            sized.push((name.as_str(), res.size));
        }
        Ok(offset_ranges(sized))
    }

    fn design_var_ranges(&self, wrt: &[String]) -> MdoResult<Vec<VarRange>> {
        let mut sized = Vec::with_capacity(wrt.len());
        for name in wrt {
            let dv = self.design_var(name).ok_or_else(|| {
                MdoError::Validation(format!("unknown design variable '{name}'"))
            })?;
            sized.push((name.as_str(), dv.size));
        }
        Ok(offset_ranges(sized))
    }

    fn assemble(&self, res_ranges: &[VarRange], dv_ranges: &[VarRange]) -> Blocks {
        let n_u = self.state_size;
        let n_f = res_ranges.last().map_or(0, |r| r.end + 1);
        let n_x = dv_ranges.last().map_or(0, |r| r.end + 1);

        let mut blocks = Blocks {
            a: vec![vec![0.0; n_u]; n_u],
            b: vec![vec![0.0; n_x]; n_u],
            c: vec![vec![0.0; n_u]; n_f],
            d: vec![vec![0.0; n_x]; n_f],
        };
        if n_u > 0 {
            if let Some(a) = self.block(STATE, STATE) {
                place(&mut blocks.a, &a, 0, 0);
            }
            for dv in dv_ranges {
                if let Some(b) = self.block(STATE, &dv.name) {
                    place(&mut blocks.b, &b, 0, dv.start);
                }
            }
        }
        for res in res_ranges {
            if n_u > 0 {
                if let Some(c) = self.block(&res.name, STATE) {
                    place(&mut blocks.c, &c, res.start, 0);
                }
            }
            for dv in dv_ranges {
                if let Some(d) = self.block(&res.name, &dv.name) {
                    place(&mut blocks.d, &d, res.start, dv.start);
                }
            }
        }
        blocks
    }

    /// Factor the state operator once for every solve of this linearization.
    fn factor_state(&self, blocks: &Blocks) -> MdoResult<Option<Box<dyn Factorization>>> {
        if self.state_size == 0 {
            return Ok(None);
        }
        self.backend.factor(&blocks.a).map(Some)
    }

    /// `D s + C A⁻¹ B s` for a seed vector `s`.
    fn propagate(
        blocks: &Blocks,
        factors: Option<&dyn Factorization>,
        seed: &[f64],
    ) -> MdoResult<Vec<f64>> {
        let mut out = matvec(&blocks.d, seed);
        if let Some(factors) = factors {
            let du = factors.solve(&matvec(&blocks.b, seed))?;
            for (target, value) in out.iter_mut().zip(matvec(&blocks.c, &du)) {
                *target += value;
            }
        }
        Ok(out)
    }

    fn colored_totals(
        coloring: &SimulColoring,
        blocks: &Blocks,
        factors: Option<&dyn Factorization>,
        res_ranges: &[VarRange],
        dv_ranges: &[VarRange],
        totals: &mut [Vec<f64>],
    ) -> MdoResult<usize> {
        let n_x = dv_ranges.last().map_or(0, |r| r.end + 1);
        let mut solves = 0;
        for dv in dv_ranges {
            let Some(groups) = coloring.color_groups(&dv.name) else {
                for col in dv.indices() {
                    Self::fill_column(blocks, factors, col, n_x, totals)?;
                    solves += 1;
                }
                continue;
            };
            let colored = coloring.colorings[&dv.name].len();
            if colored != dv.size() {
                return Err(MdoError::Validation(format!(
                    "coloring for '{}' has {} entries but the variable has size {}",
                    dv.name,
                    colored,
                    dv.size()
                )));
            }
            for (color, cols) in groups {
                solves += 1;
                if cols.len() == 1 || color < 0 {
                    for &col in &cols {
                        Self::fill_column(blocks, factors, dv.start + col, n_x, totals)?;
                    }
                    continue;
                }
                let mut seed = vec![0.0; n_x];
                for &col in &cols {
                    seed[dv.start + col] = 1.0;
                }
                let result = Self::propagate(blocks, factors, &seed)?;
                for res in res_ranges {
                    let Some((rows, cols)) =
                        coloring.color_map(&res.name, &dv.name, color as usize)
                    else {
                        continue;
                    };
                    for (&row, &col) in rows.iter().zip(cols) {
                        if row >= res.size() || col >= dv.size() {
                            return Err(MdoError::Validation(format!(
                                "color map for ('{}', '{}') color {color} names entry \
                                 ({row}, {col}) outside the {}x{} block",
                                res.name,
                                dv.name,
                                res.size(),
                                dv.size()
                            )));
                        }
                        totals[res.start + row][dv.start + col] = result[res.start + row];
                    }
                }
            }
        }
        Ok(solves)
    }

    fn fill_column(
        blocks: &Blocks,
        factors: Option<&dyn Factorization>,
        col: usize,
        n_x: usize,
        totals: &mut [Vec<f64>],
    ) -> MdoResult<()> {
        let mut seed = vec![0.0; n_x];
        seed[col] = 1.0;
        let result = Self::propagate(blocks, factors, &seed)?;
        for (row, value) in result.into_iter().enumerate() {
            totals[row][col] = value;
        }
        Ok(())
    }
}

impl Problem for LinearProblem {
    fn model(&self) -> &dyn System {
        &self.model
    }

    fn design_vars(&self) -> &[DesignVarMeta] {
        &self.design_vars
    }

    fn responses(&self) -> &[ResponseMeta] {
        &self.responses
    }

    fn mode(&self) -> DerivMode {
        self.mode
    }

    fn setup(&mut self, mode: DerivMode) -> MdoResult<()> {
        self.mode = mode;
        self.model.jacobian.borrow_mut().reset();
        for comp in &self.model.children {
            comp.jacobian.borrow_mut().reset();
        }
        self.state = vec![0.0; self.state_size];
        self.outputs.clear();
        self.is_setup = true;
        debug!(mode = %mode, "linear problem set up");
        Ok(())
    }

    fn run_model(&mut self) -> MdoResult<bool> {
        self.ensure_setup()?;
        self.linearize();

        let of: Vec<String> = self.responses.iter().map(|r| r.name.clone()).collect();
        let wrt: Vec<String> = self.design_vars.iter().map(|d| d.name.clone()).collect();
        let res_ranges = self.response_ranges(&of)?;
        let dv_ranges = self.design_var_ranges(&wrt)?;
        let blocks = self.assemble(&res_ranges, &dv_ranges);

        let x: Vec<f64> = wrt
            .iter()
            .flat_map(|name| self.inputs[name].iter().copied())
            .collect();
        self.state = self
            .factor_state(&blocks)
            .and_then(|factors| match factors {
                Some(factors) => factors.solve(&matvec(&blocks.b, &x)),
                None => Ok(Vec::new()),
            })
            .map_err(|err| {
                MdoError::Analysis(format!("state equations could not be solved: {err}"))
            })?;
        let mut f = matvec(&blocks.d, &x);
        for (target, value) in f.iter_mut().zip(matvec(&blocks.c, &self.state)) {
            *target += value;
        }

        self.outputs = res_ranges
            .iter()
            .map(|res| (res.name.clone(), f[res.indices()].to_vec()))
            .collect();

        let converged = f.iter().chain(&self.state).all(|v| v.is_finite());
        debug!(converged, "linear model solved");
        Ok(!converged)
    }

    fn compute_totals(&mut self, of: &[String], wrt: &[String]) -> MdoResult<Vec<Vec<f64>>> {
        self.ensure_setup()?;
        let res_ranges = self.response_ranges(of)?;
        let dv_ranges = self.design_var_ranges(wrt)?;
        self.linearize();
        let blocks = self.assemble(&res_ranges, &dv_ranges);

        let n_f = res_ranges.last().map_or(0, |r| r.end + 1);
        let n_x = dv_ranges.last().map_or(0, |r| r.end + 1);
        let mut totals = vec![vec![0.0; n_x]; n_f];
        let factors = self.factor_state(&blocks)?;
        let factors = factors.as_deref();

        let solves = match (&self.coloring, self.mode) {
            (Some(coloring), DerivMode::Fwd) => Self::colored_totals(
                coloring,
                &blocks,
                factors,
                &res_ranges,
                &dv_ranges,
                &mut totals,
            )?,
            _ => {
                for col in 0..n_x {
                    Self::fill_column(&blocks, factors, col, n_x, &mut totals)?;
                }
                n_x
            }
        };
        debug!(rows = n_f, cols = n_x, solves, "computed total derivatives");
        Ok(totals)
    }

    fn set_design_var(&mut self, name: &str, value: &[f64]) -> MdoResult<()> {
        let size = self
            .design_var(name)
            .ok_or_else(|| MdoError::Validation(format!("unknown design variable '{name}'")))?
            .size;
        let values = match value.len() {
            1 => vec![value[0]; size],
            n if n == size => value.to_vec(),
            n => {
                return Err(MdoError::Validation(format!(
                    "design variable '{name}' has size {size} but {n} values were given"
                )))
            }
        };
        self.inputs.insert(name.to_string(), values);
        Ok(())
    }

    fn values(&self) -> BTreeMap<String, Vec<f64>> {
        self.inputs
            .iter()
            .chain(&self.outputs)
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    fn simul_coloring(&self) -> Option<&SimulColoring> {
        self.coloring.as_ref()
    }

    fn set_simul_coloring(&mut self, coloring: Option<SimulColoring>) {
        self.coloring = coloring;
    }
}

fn place(target: &mut [Vec<f64>], block: &[Vec<f64>], row0: usize, col0: usize) {
    for (i, row) in block.iter().enumerate() {
        target[row0 + i][col0..col0 + row.len()].copy_from_slice(row);
    }
}

fn matvec(matrix: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::system_iter;
    use std::rc::Rc;

    fn explicit_spec() -> LinearProblemSpec {
        LinearProblemSpec {
            design_vars: vec![DesignVarMeta::new("x", 2), DesignVarMeta::new("y", 1)],
            responses: vec![
                ResponseMeta::objective("f", 1),
                ResponseMeta::constraint("g", 2, false),
            ],
            state_size: 0,
            partials: vec![
                PartialSpec::dense("f", "x", vec![vec![1.0, 2.0]]),
                PartialSpec::list("g", "x", vec![0, 1], vec![0, 1], vec![3.0, 4.0]),
                PartialSpec::sparse("g", "y", vec![1], vec![0], vec![5.0]),
            ],
            assembled: false,
            solver: SolverKind::Lu,
        }
    }

    fn implicit_spec() -> LinearProblemSpec {
        // A = diag(2, 4), B = I, C = I: f = (x0 / 2, x1 / 4)
        LinearProblemSpec {
            design_vars: vec![DesignVarMeta::new("x", 2)],
            responses: vec![ResponseMeta::objective("f", 2)],
            state_size: 2,
            partials: vec![
                PartialSpec::list(STATE, STATE, vec![0, 1], vec![0, 1], vec![2.0, 4.0]),
                PartialSpec::list(STATE, "x", vec![0, 1], vec![0, 1], vec![1.0, 1.0]),
                PartialSpec::list("f", STATE, vec![0, 1], vec![0, 1], vec![1.0, 1.0]),
            ],
            assembled: false,
            solver: SolverKind::FullLu,
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn explicit_totals_match_declared_partials() {
        let mut problem = LinearProblem::from_spec(explicit_spec()).unwrap();
        problem.setup(DerivMode::Fwd).unwrap();
        let totals = problem
            .compute_totals(&names(&["f", "g"]), &names(&["x", "y"]))
            .unwrap();
        assert_eq!(totals[0], vec![1.0, 2.0, 0.0]);
        assert_eq!(totals[1], vec![3.0, 0.0, 0.0]);
        assert_eq!(totals[2], vec![0.0, 4.0, 5.0]);
    }

    #[test]
    fn implicit_state_is_solved() {
        let mut problem = LinearProblem::from_spec(implicit_spec()).unwrap();
        problem.setup(DerivMode::Fwd).unwrap();
        problem.set_design_var("x", &[4.0, 8.0]).unwrap();
        assert!(!problem.run_model().unwrap());
        assert_eq!(problem.values()["f"], vec![2.0, 2.0]);

        let totals = problem
            .compute_totals(&names(&["f"]), &names(&["x"]))
            .unwrap();
        assert!((totals[0][0] - 0.5).abs() < 1e-12);
        assert!((totals[1][1] - 0.25).abs() < 1e-12);
        assert_eq!(totals[0][1], 0.0);
    }

    #[test]
    fn singular_state_is_an_analysis_error() {
        let mut spec = implicit_spec();
        spec.solver = SolverKind::Lu;
        spec.partials[0] = PartialSpec::list(STATE, STATE, vec![0], vec![0], vec![1.0]);
        let mut problem = LinearProblem::from_spec(spec).unwrap();
        problem.setup(DerivMode::Fwd).unwrap();
        assert!(matches!(problem.run_model(), Err(MdoError::Analysis(_))));
    }

    #[test]
    fn run_before_setup_is_a_configuration_error() {
        let mut problem = LinearProblem::from_spec(explicit_spec()).unwrap();
        assert!(matches!(problem.run_model(), Err(MdoError::Config(_))));
    }

    #[test]
    fn scalar_design_var_values_broadcast() {
        let mut problem = LinearProblem::from_spec(explicit_spec()).unwrap();
        problem.set_design_var("x", &[3.0]).unwrap();
        assert_eq!(problem.values()["x"], vec![3.0, 3.0]);
        assert!(problem.set_design_var("x", &[1.0, 2.0, 3.0]).is_err());
        assert!(problem.set_design_var("nope", &[1.0]).is_err());
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let mut spec = explicit_spec();
        spec.partials.push(PartialSpec::dense("f", "x", vec![vec![1.0, 2.0]]));
        assert!(LinearProblem::from_spec(spec).is_err());

        let mut spec = explicit_spec();
        spec.partials = vec![PartialSpec::dense("f", "x", vec![vec![1.0]])];
        assert!(LinearProblem::from_spec(spec).is_err());

        let mut spec = explicit_spec();
        spec.partials = vec![PartialSpec::dense("x", "f", vec![vec![1.0]])];
        assert!(LinearProblem::from_spec(spec).is_err());

        let mut spec = implicit_spec();
        spec.partials.remove(0);
        assert!(LinearProblem::from_spec(spec).is_err());
    }

    #[test]
    fn assembled_problems_share_one_jacobian() {
        let mut spec = implicit_spec();
        spec.assembled = true;
        let problem = LinearProblem::from_spec(spec).unwrap();
        let systems = system_iter(problem.model(), true);
        assert_eq!(systems.len(), 3);
        let root = systems[0].jacobian();
        assert!(systems.iter().all(|s| Rc::ptr_eq(&s.jacobian(), &root)));

        let problem = LinearProblem::from_spec(implicit_spec()).unwrap();
        let systems = system_iter(problem.model(), true);
        assert!(!Rc::ptr_eq(&systems[1].jacobian(), &systems[2].jacobian()));
    }

    #[test]
    fn spec_parses_from_json() {
        let json = r#"{
            "design_vars": [{"name": "x", "size": 2}],
            "responses": [
                {"name": "f", "size": 2, "kind": {"type": "constraint", "linear": false}}
            ],
            "partials": [
                {"of": "f", "wrt": "x", "form": "list",
                 "rows": [0, 1], "cols": [0, 1], "data": [1.0, 2.0]}
            ]
        }"#;
        let spec: LinearProblemSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.state_size, 0);
        assert!(matches!(spec.partials[0].value, PartialValue::List { .. }));
        assert!(LinearProblem::from_spec(spec).is_ok());
    }
}
