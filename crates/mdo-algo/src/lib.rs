//! # mdo-algo: Jacobian Sparsity and Coloring
//!
//! Discovers which columns of a total jacobian are structurally independent
//! and groups them so that forward-mode derivatives can be computed with one
//! linear solve per group instead of one per column.
//!
//! ```rust,no_run
//! use mdo_algo::coloring::{get_simul_meta, simul_coloring_summary, ColoringOptions};
//! use mdo_core::{LinearProblem, Problem};
//! use std::path::Path;
//!
//! let mut problem = LinearProblem::from_path(Path::new("model.json"))?;
//! let options = ColoringOptions { repeats: 3, tol: 1e-15, ..Default::default() };
//! let coloring = get_simul_meta(&mut problem, &options, Some(&mut std::io::stdout()))?;
//! simul_coloring_summary(problem.design_vars(), options.mode, &coloring, &mut std::io::stderr())?;
//! # Ok::<(), mdo_core::MdoError>(())
//! ```

pub mod coloring;

pub use coloring::{get_simul_meta, simul_coloring_summary, ColoringOptions};
