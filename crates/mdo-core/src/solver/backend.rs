//! Dense factorizations of the state operator `A`.
//!
//! A model's state equations are factored once per linearization and the
//! factors are reused for the nonlinear solve and for every forward seed of a
//! total-derivative computation, colored or not.

use faer::solvers::{FullPivLu, PartialPivLu};
use faer::sparse::solvers::SpSolver;
use faer::Mat;

use crate::error::{MdoError, MdoResult};

/// Factors of a square operator, ready for repeated right-hand sides.
pub trait Factorization {
    fn dim(&self) -> usize;

    fn solve(&self, rhs: &[f64]) -> MdoResult<Vec<f64>>;
}

pub trait LinearSystemBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Factor `matrix`, failing with [`MdoError::Solver`] when it is
    /// numerically singular.
    fn factor(&self, matrix: &[Vec<f64>]) -> MdoResult<Box<dyn Factorization>>;

    /// One-shot solve of `matrix x = rhs`.
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> MdoResult<Vec<f64>> {
        self.factor(matrix)?.solve(rhs)
    }
}

fn square_mat(matrix: &[Vec<f64>]) -> MdoResult<Mat<f64>> {
    let n = matrix.len();
    if let Some(row) = matrix.iter().position(|row| row.len() != n) {
        return Err(MdoError::Solver(format!(
            "state operator must be square: row {row} has {} entries, expected {n}",
            matrix[row].len()
        )));
    }
    Ok(Mat::from_fn(n, n, |i, j| matrix[i][j]))
}

/// Reject factors whose smallest pivot is negligible next to the largest.
fn check_pivots(u: &Mat<f64>) -> MdoResult<()> {
    let n = u.nrows().min(u.ncols());
    let pivots: Vec<f64> = (0..n).map(|i| u.read(i, i).abs()).collect();
    let largest = pivots.iter().copied().fold(0.0, f64::max);
    let floor = largest * n as f64 * f64::EPSILON;
    match pivots.iter().position(|&p| !p.is_finite() || p <= floor) {
        Some(index) => Err(MdoError::Solver(format!(
            "singular matrix (pivot {index} is {:e})",
            pivots[index]
        ))),
        None => Ok(()),
    }
}

struct LuFactors<S> {
    n: usize,
    lu: Option<S>,
}

impl<S: SpSolver<f64>> Factorization for LuFactors<S> {
    fn dim(&self) -> usize {
        self.n
    }

    fn solve(&self, rhs: &[f64]) -> MdoResult<Vec<f64>> {
        if rhs.len() != self.n {
            return Err(MdoError::Solver(format!(
                "rhs length ({}) does not match matrix dimension {}",
                rhs.len(),
                self.n
            )));
        }
        let Some(lu) = &self.lu else {
            return Ok(Vec::new());
        };
        let rhs = Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        let sol = lu.solve(&rhs);
        let solution: Vec<f64> = (0..self.n).map(|i| sol.read(i, 0)).collect();
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(MdoError::Solver("solution is not finite".into()));
        }
        Ok(solution)
    }
}

/// LU with partial (row) pivoting.
#[derive(Debug, Clone, Default)]
pub struct LuSolver;

impl LinearSystemBackend for LuSolver {
    fn name(&self) -> &'static str {
        "lu"
    }

    fn factor(&self, matrix: &[Vec<f64>]) -> MdoResult<Box<dyn Factorization>> {
        let mat = square_mat(matrix)?;
        let n = mat.nrows();
        if n == 0 {
            return Ok(Box::new(LuFactors::<PartialPivLu<f64>> { n, lu: None }));
        }
        let lu = PartialPivLu::new(mat.as_ref());
        check_pivots(&lu.compute_u())?;
        Ok(Box::new(LuFactors { n, lu: Some(lu) }))
    }
}

/// LU with full (row and column) pivoting; slower, but more robust on badly
/// scaled state operators.
#[derive(Debug, Clone, Default)]
pub struct FullPivLuSolver;

impl LinearSystemBackend for FullPivLuSolver {
    fn name(&self) -> &'static str {
        "full-lu"
    }

    fn factor(&self, matrix: &[Vec<f64>]) -> MdoResult<Box<dyn Factorization>> {
        let mat = square_mat(matrix)?;
        let n = mat.nrows();
        if n == 0 {
            return Ok(Box::new(LuFactors::<FullPivLu<f64>> { n, lu: None }));
        }
        let lu = FullPivLu::new(mat.as_ref());
        check_pivots(&lu.compute_u())?;
        Ok(Box::new(LuFactors { n, lu: Some(lu) }))
    }
}
