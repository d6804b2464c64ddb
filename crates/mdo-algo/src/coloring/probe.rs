//! Randomized probing of partial derivatives.
//!
//! Real partials can cancel numerically and make a structurally nonzero
//! entry of the total jacobian look like zero. While the structure is being
//! computed, every sub-jacobian stored through `set_abs` is replaced with
//! uniform random values centered on zero and scaled to the spread of the
//! original values. Structural zeros of sparse and list forms stay zero.

use faer::Mat;
use mdo_core::{system_iter, SetAbsOverride, SharedJacobian, SubJac, SubjacKey, System};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::debug;

/// Spreads smaller than this are replaced with 1.0.
const MIN_SPREAD: f64 = 0.01;

/// `set_abs` override that swaps sub-jacobian values for probe values.
///
/// Clones share one random stream, so a seeded probe installed on several
/// jacobians stays reproducible.
#[derive(Clone)]
pub struct SparsityProbe {
    tol: f64,
    rng: Rc<RefCell<StdRng>>,
}

impl SparsityProbe {
    pub fn new(tol: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            tol,
            rng: Rc::new(RefCell::new(rng)),
        }
    }

    /// Probe values for one block, one per stored value.
    ///
    /// Values are drawn from `[-spread/2, spread/2)`. Anything with magnitude
    /// below the tolerance is pushed one spread away from zero in its own
    /// direction, so no probe value is ever treated as a structural zero.
    pub fn randomize(&self, values: &[f64]) -> Vec<f64> {
        if values.is_empty() {
            return Vec::new();
        }
        let spread = spread_of(values);
        let mut rng = self.rng.borrow_mut();
        values
            .iter()
            .map(|_| scaled_draw(rng.gen::<f64>(), spread, self.tol))
            .collect()
    }
}

/// Range of `values`, or 1.0 when the range is too narrow to scale by.
fn spread_of(values: &[f64]) -> f64 {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let spread = max - min;
    if spread.is_nan() || spread < MIN_SPREAD {
        1.0
    } else {
        spread
    }
}

/// Map a unit draw in `[0, 1)` to a value centered on zero.
fn scaled_draw(draw: f64, spread: f64, tol: f64) -> f64 {
    let value = draw * spread - spread / 2.0;
    if value.abs() >= tol {
        value
    } else if value < 0.0 {
        value - spread
    } else {
        value + spread
    }
}

impl SetAbsOverride for SparsityProbe {
    fn set_abs(&mut self, _key: &SubjacKey, subjac: SubJac) -> SubJac {
        match subjac {
            SubJac::Dense(mat) => {
                let (nrows, ncols) = (mat.nrows(), mat.ncols());
                let probe = self.randomize(&SubJac::Dense(mat).values());
                SubJac::Dense(Mat::from_fn(nrows, ncols, |i, j| probe[j * nrows + i]))
            }
            SubJac::Sparse(mut mat) => {
                let probe = self.randomize(mat.data());
                mat.data_mut().copy_from_slice(&probe);
                SubJac::Sparse(mat)
            }
            SubJac::List {
                rows,
                cols,
                data,
                shape,
            } => SubJac::List {
                data: self.randomize(&data),
                rows,
                cols,
                shape,
            },
        }
    }
}

/// Probe installed on every distinct jacobian of a model tree.
///
/// Dropping the scope removes the probe, puts back whatever override each
/// jacobian had before, and clears the cached sub-jacobians so no probe values
/// outlive the analysis.
pub struct ProbeScope {
    installed: Vec<(SharedJacobian, Option<Box<dyn SetAbsOverride>>)>,
}

impl ProbeScope {
    pub fn install(root: &dyn System, probe: &SparsityProbe) -> Self {
        let mut seen = HashSet::new();
        let mut installed = Vec::new();
        for system in system_iter(root, true) {
            let jacobian = system.jacobian();
            if !seen.insert(Rc::as_ptr(&jacobian)) {
                continue;
            }
            let previous = jacobian
                .borrow_mut()
                .install_override(Box::new(probe.clone()));
            installed.push((jacobian, previous));
        }
        debug!(jacobians = installed.len(), "installed sparsity probe");
        Self { installed }
    }

    /// Number of distinct jacobians carrying the probe.
    pub fn len(&self) -> usize {
        self.installed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}

impl Drop for ProbeScope {
    fn drop(&mut self) {
        for (jacobian, previous) in self.installed.drain(..) {
            let mut jacobian = jacobian.borrow_mut();
            jacobian.remove_override();
            if let Some(previous) = previous {
                jacobian.install_override(previous);
            }
            jacobian.reset();
        }
        debug!("removed sparsity probe");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdo_core::{subjac_key, Jacobian};

    #[test]
    fn probe_values_stay_within_spread_and_away_from_zero() {
        let probe = SparsityProbe::new(0.3, Some(7));
        let values = probe.randomize(&[0.0, 1.0, 2.0, 0.5]);
        assert_eq!(values.len(), 4);
        for v in values {
            assert!(v.abs() >= 0.3, "{v} is below the tolerance");
            assert!(v.abs() <= 3.0, "{v} is outside the pushed range");
        }
    }

    #[test]
    fn draws_inside_the_tolerance_move_one_spread_outward() {
        assert_eq!(scaled_draw(0.75, 2.0, 0.1), 0.5);
        assert_eq!(scaled_draw(0.75, 2.0, 10.0), 2.5);
        assert_eq!(scaled_draw(0.25, 2.0, 10.0), -2.5);
        assert_eq!(scaled_draw(0.5, 2.0, 10.0), 2.0);
    }

    #[test]
    fn every_value_is_pushed_when_the_tolerance_exceeds_the_spread() {
        let values = [0.0, 1.0, 4.0, -2.0, 3.0];
        let spread = 6.0;
        let pushed = SparsityProbe::new(100.0, Some(11)).randomize(&values);

        let mut rng = StdRng::seed_from_u64(11);
        for got in pushed {
            let raw = rng.gen::<f64>() * spread - spread / 2.0;
            let want = if raw < 0.0 { raw - spread } else { raw + spread };
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
            assert!(got.abs() >= spread / 2.0);
        }
    }

    #[test]
    fn list_form_keeps_its_triplets() {
        let mut randomizer = SparsityProbe::new(1e-15, Some(9));
        let sub = SubJac::list(vec![2, 0, 1], vec![0, 3, 1], vec![1.0, -1.0, 0.0], (3, 4)).unwrap();
        let SubJac::List {
            rows,
            cols,
            data,
            shape,
        } = randomizer.set_abs(&subjac_key("y", "x"), sub)
        else {
            panic!("list block changed form");
        };
        assert_eq!(rows, vec![2, 0, 1]);
        assert_eq!(cols, vec![0, 3, 1]);
        assert_eq!(shape, (3, 4));
        assert_eq!(data.len(), 3);
        assert!(data.iter().all(|&v| v != 0.0));
    }

    #[test]
    fn narrow_spread_falls_back_to_one() {
        let probe = SparsityProbe::new(1e-15, Some(1));
        for v in probe.randomize(&[5.0; 32]) {
            assert!((-0.5..0.5).contains(&v));
        }
    }

    #[test]
    fn seeded_probes_are_reproducible() {
        let a = SparsityProbe::new(1e-15, Some(42)).randomize(&[1.0, 2.0, 3.0]);
        let b = SparsityProbe::new(1e-15, Some(42)).randomize(&[1.0, 2.0, 3.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn sparse_probe_keeps_the_pattern() {
        let mut probe = SparsityProbe::new(1e-15, Some(3));
        let sub = SubJac::sparse(&[0, 2], &[1, 0], &[1.0, 1.0], (3, 2)).unwrap();
        let probed = probe.set_abs(&subjac_key("y", "x"), sub).to_dense();
        assert_ne!(probed[0][1], 0.0);
        assert_ne!(probed[2][0], 0.0);
        assert_eq!(probed[0][0], 0.0);
        assert_eq!(probed[1], vec![0.0, 0.0]);
    }

    #[test]
    fn dense_probe_keeps_the_shape() {
        let mut probe = SparsityProbe::new(1e-15, Some(5));
        let sub = SubJac::dense(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let probed = probe.set_abs(&subjac_key("y", "x"), sub);
        assert_eq!(probed.shape(), (2, 3));
        assert!(probed.values().iter().all(|&v| v != 0.0));
    }

    struct Node {
        jac: SharedJacobian,
        children: Vec<Node>,
    }

    impl System for Node {
        fn pathname(&self) -> &str {
            "node"
        }

        fn jacobian(&self) -> SharedJacobian {
            self.jac.clone()
        }

        fn subsystems(&self) -> Vec<&dyn System> {
            self.children.iter().map(|c| c as &dyn System).collect()
        }
    }

    #[test]
    fn scope_installs_once_per_shared_jacobian_and_cleans_up() {
        let shared = Jacobian::new().into_shared();
        let own = Jacobian::new().into_shared();
        let root = Node {
            jac: shared.clone(),
            children: vec![
                Node {
                    jac: shared.clone(),
                    children: Vec::new(),
                },
                Node {
                    jac: own.clone(),
                    children: Vec::new(),
                },
            ],
        };

        let probe = SparsityProbe::new(1e-15, Some(0));
        {
            let scope = ProbeScope::install(&root, &probe);
            assert_eq!(scope.len(), 2);
            assert!(shared.borrow().has_override());
            own.borrow_mut().set_abs(
                subjac_key("y", "x"),
                SubJac::dense(&[vec![1.0]]).unwrap(),
            );
            assert_eq!(own.borrow().len(), 1);
        }
        assert!(!shared.borrow().has_override());
        assert!(!own.borrow().has_override());
        assert!(own.borrow().is_empty());
    }
}
