//! # mdo-core: Problem Model and Total Derivatives
//!
//! Shared data structures for multidisciplinary design problems: declared
//! design variables and responses, per-system jacobian storage, and the
//! [`Problem`] abstraction the coloring and sweep crates work against.
//!
//! ## Layout
//!
//! - [`vars`]: variable metadata and the inclusive offset ranges that place
//!   each variable inside a total jacobian
//! - [`jacobian`]: sub-jacobian storage with an interceptable `set_abs`
//! - [`system`]: model-tree traversal
//! - [`problem`]: the total-derivative provider trait and [`DerivMode`]
//! - [`coloring`]: the persisted [`SimulColoring`]
//! - [`linear`]: [`LinearProblem`], a complete provider for linear models
//! - [`solver`]: dense linear-system backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mdo_core::*;
//! use std::path::Path;
//!
//! let mut problem = LinearProblem::from_path(Path::new("model.json"))?;
//! problem.setup(DerivMode::Fwd)?;
//! problem.set_design_var("x", &[1.0])?;
//! let failed = problem.run_model()?;
//! let totals = problem.compute_totals(&["f".to_string()], &["x".to_string()])?;
//! # Ok::<(), MdoError>(())
//! ```

pub mod coloring;
pub mod error;
pub mod jacobian;
pub mod linear;
pub mod problem;
pub mod solver;
pub mod system;
pub mod vars;

pub use coloring::{ColorMap, ResponseColorMaps, SimulColoring};
pub use error::{MdoError, MdoResult};
pub use jacobian::{subjac_key, Jacobian, SetAbsOverride, SharedJacobian, SubJac, SubjacKey};
pub use linear::{
    load_problem_spec, LinearProblem, LinearProblemSpec, PartialSpec, PartialValue, STATE,
};
pub use problem::{DerivMode, Problem};
pub use solver::{
    Factorization, FullPivLuSolver, LinearSystemBackend, LuSolver, SolverKind,
};
pub use system::{system_iter, System};
pub use vars::{
    find_var_from_range, offset_ranges, DesignVarMeta, ResponseKind, ResponseMeta, VarRange,
};
