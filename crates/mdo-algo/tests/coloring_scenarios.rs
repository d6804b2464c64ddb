use mdo_algo::coloring::*;
use mdo_core::*;
use std::collections::BTreeSet;

fn options(seed: u64) -> ColoringOptions {
    ColoringOptions {
        tol: 1e-15,
        seed: Some(seed),
        ..ColoringOptions::default()
    }
}

/// `A` touches rows {0,1} and {2,3}; both columns of `B` touch every row.
fn split_and_coupled() -> LinearProblem {
    LinearProblem::from_spec(LinearProblemSpec {
        design_vars: vec![DesignVarMeta::new("A", 2), DesignVarMeta::new("B", 2)],
        responses: vec![ResponseMeta::objective("f", 4)],
        state_size: 0,
        partials: vec![
            PartialSpec::list("f", "A", vec![0, 1, 2, 3], vec![0, 0, 1, 1], vec![1.0; 4]),
            PartialSpec::dense("f", "B", vec![vec![1.0, 1.0]; 4]),
        ],
        assembled: false,
        solver: SolverKind::Lu,
    })
    .unwrap()
}

/// f0 depends on x0 and x2, f1 on x1 and x3, through a diagonal state.
fn banded_with_state(assembled: bool) -> LinearProblem {
    LinearProblem::from_spec(LinearProblemSpec {
        design_vars: vec![DesignVarMeta::new("x", 4), DesignVarMeta::new("s", 1)],
        responses: vec![
            ResponseMeta::objective("f", 2),
            ResponseMeta::constraint("lin", 1, true),
        ],
        state_size: 2,
        partials: vec![
            PartialSpec::list(STATE, STATE, vec![0, 1], vec![0, 1], vec![2.0, 3.0]),
            PartialSpec::sparse(
                STATE,
                "x",
                vec![0, 0, 1, 1],
                vec![0, 2, 1, 3],
                vec![1.0, 2.0, 3.0, 4.0],
            ),
            PartialSpec::list("f", STATE, vec![0, 1], vec![0, 1], vec![1.0, 1.0]),
            PartialSpec::dense("f", "s", vec![vec![1.0], vec![1.0]]),
            PartialSpec::dense("lin", "x", vec![vec![1.0; 4]]),
        ],
        assembled,
        solver: SolverKind::Lu,
    })
    .unwrap()
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn split_columns_share_a_color_and_coupled_columns_do_not() {
    let mut problem = split_and_coupled();
    let coloring = get_simul_meta(&mut problem, &options(11), None).unwrap();

    assert_eq!(coloring.colorings["A"], vec![0, 0]);
    assert_eq!(coloring.colorings["B"], vec![0, 1]);
    assert_eq!(
        coloring.color_map("f", "A", 0),
        Some(&(vec![0, 1, 2, 3], vec![0, 0, 1, 1]))
    );
    assert!(coloring.maps["f"].get("B").is_none());

    let mut out = Vec::new();
    let summary =
        simul_coloring_summary(problem.design_vars(), DerivMode::Fwd, &coloring, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("A num colors: 1   size: 2\n"));
    assert!(text.contains("B num colors: 2   size: 2\n"));
    assert!(text.ends_with("Total colors vs. total size: 3 vs 4\n"));
    assert_eq!(summary.total_colors, 3);
}

#[test]
fn size_one_variables_are_never_colored() {
    let mut problem = banded_with_state(false);
    let coloring = get_simul_meta(&mut problem, &options(3), None).unwrap();
    assert!(!coloring.colorings.contains_key("s"));
    assert!(coloring.maps.values().all(|per_dv| !per_dv.contains_key("s")));
}

#[test]
fn colorings_cover_every_column_with_disjoint_groups() {
    for assembled in [false, true] {
        let mut problem = banded_with_state(assembled);
        let structure = compute_structure(&mut problem, &options(5)).unwrap();
        let coloring = get_simul_meta(&mut problem, &options(5), None).unwrap();

        let x = &coloring.colorings["x"];
        assert_eq!(x, &vec![0, 0, 1, 1]);
        let colors: BTreeSet<i64> = x.iter().copied().collect();
        assert_eq!(colors, (0..2).collect());

        let range = &structure.dv_ranges[0];
        for (color, cols) in coloring.color_groups("x").unwrap() {
            assert!(color >= 0);
            for (i, &a) in cols.iter().enumerate() {
                for &b in &cols[i + 1..] {
                    assert!(structure
                        .jac
                        .columns_disjoint(range.start + a, range.start + b));
                }
            }
        }
    }
}

#[test]
fn linear_constraints_are_excluded_from_the_structure() {
    let mut problem = banded_with_state(false);
    let structure = compute_structure(&mut problem, &options(1)).unwrap();
    assert_eq!(structure.jac.nrows(), 2);
    assert_eq!(structure.res_ranges.len(), 1);
    assert_eq!(structure.res_ranges[0].name, "f");
    assert_eq!(structure.jac.ncols(), 5);
}

#[test]
fn repeated_evaluations_keep_a_deterministic_structure() {
    let mut problem = banded_with_state(false);
    let once = compute_structure(&mut problem, &options(9)).unwrap();
    let thrice = compute_structure(
        &mut problem,
        &ColoringOptions {
            repeats: 3,
            ..options(9)
        },
    )
    .unwrap();
    assert_eq!(once.jac, thrice.jac);
}

#[test]
fn written_coloring_reparses_to_the_same_values() {
    let mut problem = split_and_coupled();
    let mut out = Vec::new();
    let coloring = get_simul_meta(&mut problem, &options(2), Some(&mut out)).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("[\n   {\n      \"A\": [0, 0],"));
    assert_eq!(read_coloring(text.as_bytes()).unwrap(), coloring);
}

#[test]
fn colored_totals_match_plain_totals() {
    let mut problem = banded_with_state(false);
    let coloring = get_simul_meta(&mut problem, &options(4), None).unwrap();
    assert!(problem.simul_coloring().is_none());

    let (of, wrt) = (names(&["f"]), names(&["x", "s"]));
    problem.setup(DerivMode::Fwd).unwrap();
    let plain = problem.compute_totals(&of, &wrt).unwrap();
    problem.set_simul_coloring(Some(coloring));
    let colored = problem.compute_totals(&of, &wrt).unwrap();
    for (a, b) in plain.iter().flatten().zip(colored.iter().flatten()) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }
}

struct PassThrough;

impl SetAbsOverride for PassThrough {
    fn set_abs(&mut self, _key: &SubjacKey, subjac: SubJac) -> SubJac {
        subjac
    }
}

#[test]
fn jacobian_hooks_are_restored_after_coloring() {
    let mut problem = banded_with_state(false);
    problem
        .model()
        .jacobian()
        .borrow_mut()
        .install_override(Box::new(PassThrough));

    get_simul_meta(&mut problem, &options(6), None).unwrap();

    let systems = system_iter(problem.model(), true);
    assert!(systems[0].jacobian().borrow().has_override());
    for system in &systems[1..] {
        assert!(!system.jacobian().borrow().has_override());
        assert!(system.jacobian().borrow().is_empty());
    }
}

#[test]
fn hooks_and_coloring_are_cleared_when_the_model_fails() {
    let mut problem = LinearProblem::from_spec(LinearProblemSpec {
        design_vars: vec![DesignVarMeta::new("x", 2)],
        responses: vec![ResponseMeta::objective("f", 2)],
        state_size: 2,
        partials: vec![
            PartialSpec::list(STATE, STATE, vec![0], vec![0], vec![1.0]),
            PartialSpec::list(STATE, "x", vec![0, 1], vec![0, 1], vec![1.0, 1.0]),
            PartialSpec::list("f", STATE, vec![0, 1], vec![0, 1], vec![1.0, 1.0]),
        ],
        assembled: false,
        solver: SolverKind::Lu,
    })
    .unwrap();
    problem.set_simul_coloring(Some(SimulColoring::default()));

    let result = get_simul_meta(&mut problem, &options(8), None);
    assert!(matches!(result, Err(MdoError::Analysis(_))));
    assert!(problem.simul_coloring().is_none());
    for system in system_iter(problem.model(), true) {
        assert!(!system.jacobian().borrow().has_override());
    }
}

#[test]
fn configuration_errors_happen_before_any_work() {
    let mut problem = split_and_coupled();
    let mut out = Vec::new();
    let rev = ColoringOptions {
        mode: DerivMode::Rev,
        ..options(0)
    };
    assert!(matches!(
        get_simul_meta(&mut problem, &rev, Some(&mut out)),
        Err(MdoError::Config(_))
    ));
    assert!(out.is_empty());

    let mut only_linear = LinearProblem::from_spec(LinearProblemSpec {
        design_vars: vec![DesignVarMeta::new("x", 2)],
        responses: vec![ResponseMeta::constraint("lin", 1, true)],
        state_size: 0,
        partials: vec![PartialSpec::dense("lin", "x", vec![vec![1.0, 1.0]])],
        assembled: false,
        solver: SolverKind::Lu,
    })
    .unwrap();
    match get_simul_meta(&mut only_linear, &options(0), None) {
        Err(MdoError::Config(msg)) => {
            assert!(msg.contains("without design variables and responses"))
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }
}
