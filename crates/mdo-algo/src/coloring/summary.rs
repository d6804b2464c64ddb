//! Human-readable coloring summary.

use mdo_core::{DerivMode, DesignVarMeta, MdoError, MdoResult, SimulColoring};
use serde::Serialize;
use std::io::Write;

/// Linear solves needed for one design variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesignVarColors {
    pub name: String,
    pub num_colors: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColoringSummary {
    pub design_vars: Vec<DesignVarColors>,
    pub total_colors: usize,
    pub total_size: usize,
    /// False when the coloring is empty and no columns can be solved together.
    pub simultaneous: bool,
}

/// Write the per-variable color counts and totals, and return them.
///
/// Variables missing from the coloring need one solve per entry. Only forward
/// mode is supported; reverse mode fails before anything is written.
pub fn simul_coloring_summary(
    design_vars: &[DesignVarMeta],
    mode: DerivMode,
    coloring: &SimulColoring,
    out: &mut dyn Write,
) -> MdoResult<ColoringSummary> {
    if mode == DerivMode::Rev {
        return Err(MdoError::Config(
            "rev mode currently not supported for simultaneous derivatives".into(),
        ));
    }

    write!(out, "\n\nColoring Summary\n")?;

    let mut rows = Vec::with_capacity(design_vars.len());
    for dv in design_vars {
        let num_colors = coloring.num_colors(&dv.name).unwrap_or(dv.size);
        writeln!(out, "{} num colors: {}   size: {}", dv.name, num_colors, dv.size)?;
        rows.push(DesignVarColors {
            name: dv.name.clone(),
            num_colors,
            size: dv.size,
        });
    }

    let total_colors = rows.iter().map(|row| row.num_colors).sum();
    let total_size = rows.iter().map(|row| row.size).sum();
    let simultaneous = !coloring.is_empty();
    if simultaneous {
        writeln!(out, "Total colors vs. total size: {total_colors} vs {total_size}")?;
    } else {
        writeln!(
            out,
            "No simultaneous derivative solves are possible in this configuration."
        )?;
    }

    Ok(ColoringSummary {
        design_vars: rows,
        total_colors,
        total_size,
        simultaneous,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design_vars() -> Vec<DesignVarMeta> {
        vec![
            DesignVarMeta::new("x", 4),
            DesignVarMeta::new("s", 1),
        ]
    }

    #[test]
    fn missing_variables_count_as_their_size() {
        let mut coloring = SimulColoring::default();
        coloring.colorings.insert("x".into(), vec![0, 0, 1, 1]);
        let mut out = Vec::new();
        let summary =
            simul_coloring_summary(&design_vars(), DerivMode::Fwd, &coloring, &mut out).unwrap();
        assert_eq!(summary.total_colors, 3);
        assert_eq!(summary.total_size, 5);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "\n\nColoring Summary\nx num colors: 2   size: 4\ns num colors: 1   size: 1\nTotal colors vs. total size: 3 vs 5\n"
        );
    }

    #[test]
    fn empty_coloring_reports_no_savings() {
        let mut out = Vec::new();
        let summary = simul_coloring_summary(
            &design_vars(),
            DerivMode::Fwd,
            &SimulColoring::default(),
            &mut out,
        )
        .unwrap();
        assert!(!summary.simultaneous);
        let text = String::from_utf8(out).unwrap();
        assert!(text
            .ends_with("No simultaneous derivative solves are possible in this configuration.\n"));
    }

    #[test]
    fn reverse_mode_fails_without_output() {
        let mut out = Vec::new();
        let result = simul_coloring_summary(
            &design_vars(),
            DerivMode::Rev,
            &SimulColoring::default(),
            &mut out,
        );
        assert!(matches!(result, Err(MdoError::Config(_))));
        assert!(out.is_empty());
    }
}
