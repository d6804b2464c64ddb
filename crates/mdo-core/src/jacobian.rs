//! Partial-derivative storage for the systems of a model tree.
//!
//! Every system exposes a [`Jacobian`] holding its sub-jacobians keyed by
//! `(of, wrt)`. Values enter the jacobian through [`Jacobian::set_abs`]; an
//! optional [`SetAbsOverride`] can intercept that call and replace the values
//! before they are stored. Sparsity probing uses the override slot to swap real
//! partials for random probe values while a structure analysis runs.
//!
//! Sub-jacobians come in three forms, matching how partials are declared:
//!
//! | Form | Storage | Structural zeros |
//! |------|---------|------------------|
//! | [`SubJac::Dense`] | `faer::Mat` | none, every entry is a nonzero |
//! | [`SubJac::Sparse`] | `sprs::CsMat` (CSR) | everything outside the pattern |
//! | [`SubJac::List`] | row/col/value triplets | everything outside the list |

use faer::Mat;
use sprs::{CsMat, TriMat};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{MdoError, MdoResult};

/// `(of, wrt)` pair naming a sub-jacobian.
pub type SubjacKey = (String, String);

/// Jacobian shared between systems; nested systems may own the same instance.
pub type SharedJacobian = Rc<RefCell<Jacobian>>;

pub fn subjac_key(of: &str, wrt: &str) -> SubjacKey {
    (of.to_string(), wrt.to_string())
}

/// A single block of partial derivatives.
#[derive(Debug, Clone)]
pub enum SubJac {
    Dense(Mat<f64>),
    Sparse(CsMat<f64>),
    List {
        rows: Vec<usize>,
        cols: Vec<usize>,
        data: Vec<f64>,
        shape: (usize, usize),
    },
}

impl SubJac {
    /// Build a dense block from row-major values.
    pub fn dense(values: &[Vec<f64>]) -> MdoResult<Self> {
        let nrows = values.len();
        let ncols = values.first().map_or(0, Vec::len);
        if values.iter().any(|row| row.len() != ncols) {
            return Err(MdoError::Validation(
                "dense sub-jacobian rows must all have the same length".into(),
            ));
        }
        Ok(SubJac::Dense(Mat::from_fn(nrows, ncols, |i, j| values[i][j])))
    }

    /// Build a CSR block from triplets. Duplicate entries are summed.
    pub fn sparse(
        rows: &[usize],
        cols: &[usize],
        data: &[f64],
        shape: (usize, usize),
    ) -> MdoResult<Self> {
        check_triplets(rows, cols, data, shape)?;
        let mut triplets = TriMat::new(shape);
        for ((&r, &c), &v) in rows.iter().zip(cols).zip(data) {
            triplets.add_triplet(r, c, v);
        }
        Ok(SubJac::Sparse(triplets.to_csr()))
    }

    /// Build a list-form block, keeping the declared triplet order.
    pub fn list(
        rows: Vec<usize>,
        cols: Vec<usize>,
        data: Vec<f64>,
        shape: (usize, usize),
    ) -> MdoResult<Self> {
        check_triplets(&rows, &cols, &data, shape)?;
        Ok(SubJac::List {
            rows,
            cols,
            data,
            shape,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            SubJac::Dense(mat) => (mat.nrows(), mat.ncols()),
            SubJac::Sparse(mat) => mat.shape(),
            SubJac::List { shape, .. } => *shape,
        }
    }

    /// Stored values, in storage order.
    pub fn values(&self) -> Vec<f64> {
        match self {
            SubJac::Dense(mat) => {
                let mut values = Vec::with_capacity(mat.nrows() * mat.ncols());
                for j in 0..mat.ncols() {
                    for i in 0..mat.nrows() {
                        values.push(mat.read(i, j));
                    }
                }
                values
            }
            SubJac::Sparse(mat) => mat.data().to_vec(),
            SubJac::List { data, .. } => data.clone(),
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        match self {
            SubJac::Dense(mat) => mat.nrows() * mat.ncols(),
            SubJac::Sparse(mat) => mat.nnz(),
            SubJac::List { data, .. } => data.len(),
        }
    }

    /// Expand to a row-major dense block. List entries at the same position
    /// accumulate.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let (nrows, ncols) = self.shape();
        let mut out = vec![vec![0.0; ncols]; nrows];
        match self {
            SubJac::Dense(mat) => {
                for (i, row) in out.iter_mut().enumerate() {
                    for (j, value) in row.iter_mut().enumerate() {
                        *value = mat.read(i, j);
                    }
                }
            }
            SubJac::Sparse(mat) => {
                for (&value, (i, j)) in mat.iter() {
                    out[i][j] += value;
                }
            }
            SubJac::List {
                rows, cols, data, ..
            } => {
                for ((&i, &j), &value) in rows.iter().zip(cols).zip(data) {
                    out[i][j] += value;
                }
            }
        }
        out
    }

    pub fn form(&self) -> &'static str {
        match self {
            SubJac::Dense(_) => "dense",
            SubJac::Sparse(_) => "sparse",
            SubJac::List { .. } => "list",
        }
    }
}

fn check_triplets(
    rows: &[usize],
    cols: &[usize],
    data: &[f64],
    shape: (usize, usize),
) -> MdoResult<()> {
    if rows.len() != cols.len() || rows.len() != data.len() {
        return Err(MdoError::Validation(format!(
            "sub-jacobian triplets have mismatched lengths (rows {}, cols {}, data {})",
            rows.len(),
            cols.len(),
            data.len()
        )));
    }
    if let Some((&r, &c)) = rows
        .iter()
        .zip(cols)
        .find(|&(&r, &c)| r >= shape.0 || c >= shape.1)
    {
        return Err(MdoError::Validation(format!(
            "sub-jacobian entry ({r}, {c}) is outside shape {shape:?}"
        )));
    }
    Ok(())
}

/// Replacement for the "set absolute sub-jacobian" operation of a jacobian.
pub trait SetAbsOverride {
    /// Receive the values about to be stored for `key` and return what
    /// should be stored instead.
    fn set_abs(&mut self, key: &SubjacKey, subjac: SubJac) -> SubJac;
}

/// Sub-jacobians of one or more systems.
#[derive(Default)]
pub struct Jacobian {
    subjacs: BTreeMap<SubjacKey, SubJac>,
    set_abs_override: Option<Box<dyn SetAbsOverride>>,
}

impl Jacobian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedJacobian {
        Rc::new(RefCell::new(self))
    }

    /// Store the values of a sub-jacobian, routing them through the installed
    /// override when there is one.
    pub fn set_abs(&mut self, key: SubjacKey, subjac: SubJac) {
        let subjac = match self.set_abs_override.as_mut() {
            Some(hook) => hook.set_abs(&key, subjac),
            None => subjac,
        };
        self.subjacs.insert(key, subjac);
    }

    pub fn get(&self, of: &str, wrt: &str) -> Option<&SubJac> {
        self.subjacs.get(&subjac_key(of, wrt))
    }

    pub fn keys(&self) -> impl Iterator<Item = &SubjacKey> {
        self.subjacs.keys()
    }

    pub fn len(&self) -> usize {
        self.subjacs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjacs.is_empty()
    }

    /// Install an override, returning the one it displaced.
    pub fn install_override(
        &mut self,
        hook: Box<dyn SetAbsOverride>,
    ) -> Option<Box<dyn SetAbsOverride>> {
        self.set_abs_override.replace(hook)
    }

    pub fn remove_override(&mut self) -> Option<Box<dyn SetAbsOverride>> {
        self.set_abs_override.take()
    }

    pub fn has_override(&self) -> bool {
        self.set_abs_override.is_some()
    }

    /// Drop every cached sub-jacobian.
    pub fn reset(&mut self) {
        self.subjacs.clear();
    }
}

impl fmt::Debug for Jacobian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jacobian")
            .field("subjacs", &self.subjacs.keys().collect::<Vec<_>>())
            .field("has_override", &self.has_override())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl SetAbsOverride for Doubler {
        fn set_abs(&mut self, _key: &SubjacKey, subjac: SubJac) -> SubJac {
            match subjac {
                SubJac::List {
                    rows,
                    cols,
                    data,
                    shape,
                } => SubJac::List {
                    rows,
                    cols,
                    data: data.iter().map(|v| v * 2.0).collect(),
                    shape,
                },
                other => other,
            }
        }
    }

    #[test]
    fn dense_block_roundtrips_through_faer() {
        let sub = SubJac::dense(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(sub.shape(), (3, 2));
        assert_eq!(sub.nnz(), 6);
        assert_eq!(sub.to_dense()[2], vec![5.0, 6.0]);
    }

    #[test]
    fn ragged_dense_block_is_rejected() {
        assert!(SubJac::dense(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn sparse_block_expands_pattern_only() {
        let sub = SubJac::sparse(&[0, 2], &[1, 0], &[7.0, -1.0], (3, 2)).unwrap();
        let dense = sub.to_dense();
        assert_eq!(dense[0], vec![0.0, 7.0]);
        assert_eq!(dense[1], vec![0.0, 0.0]);
        assert_eq!(dense[2], vec![-1.0, 0.0]);
        assert_eq!(sub.nnz(), 2);
    }

    #[test]
    fn triplets_outside_shape_are_rejected() {
        assert!(SubJac::list(vec![3], vec![0], vec![1.0], (3, 1)).is_err());
        assert!(SubJac::sparse(&[0, 1], &[0], &[1.0], (2, 2)).is_err());
    }

    #[test]
    fn override_intercepts_set_abs_until_removed() {
        let mut jac = Jacobian::new();
        assert!(jac.install_override(Box::new(Doubler)).is_none());

        let sub = SubJac::list(vec![0], vec![0], vec![1.5], (1, 1)).unwrap();
        jac.set_abs(subjac_key("y", "x"), sub.clone());
        assert_eq!(jac.get("y", "x").unwrap().values(), vec![3.0]);

        assert!(jac.remove_override().is_some());
        jac.set_abs(subjac_key("y", "x"), sub);
        assert_eq!(jac.get("y", "x").unwrap().values(), vec![1.5]);
    }

    #[test]
    fn reset_clears_cached_values() {
        let mut jac = Jacobian::new();
        jac.set_abs(
            subjac_key("y", "x"),
            SubJac::dense(&[vec![1.0]]).unwrap(),
        );
        assert_eq!(jac.len(), 1);
        jac.reset();
        assert!(jac.is_empty());
    }
}
