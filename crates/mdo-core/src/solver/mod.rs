pub mod backend;
pub mod registry;

pub use backend::{Factorization, FullPivLuSolver, LinearSystemBackend, LuSolver};
pub use registry::SolverKind;
