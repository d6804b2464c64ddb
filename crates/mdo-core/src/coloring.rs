//! Simultaneous-derivative coloring data.
//!
//! A [`SimulColoring`] is the persistable result of a coloring run. It
//! serializes as the two-element JSON array `[simul_colorings, simul_maps]`:
//!
//! - `simul_colorings`: `{dv_name: [color, ...]}`, one color per column of the
//!   design variable. Columns sharing a color are solved together.
//! - `simul_maps`: `{response: {dv_name: {color: [[row, ...], [col, ...]]}}}`,
//!   the (row, column) pairs a grouped solve writes back into the jacobian.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-color (row offsets, column offsets) pairs for one response and one
/// design variable.
pub type ColorMap = BTreeMap<usize, (Vec<usize>, Vec<usize>)>;

/// Response name → design variable name → color map.
pub type ResponseColorMaps = BTreeMap<String, BTreeMap<String, ColorMap>>;

type ColoringParts = (BTreeMap<String, Vec<i64>>, ResponseColorMaps);

/// Column coloring of the total jacobian, per design variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ColoringParts", into = "ColoringParts")]
pub struct SimulColoring {
    pub colorings: BTreeMap<String, Vec<i64>>,
    pub maps: ResponseColorMaps,
}

impl SimulColoring {
    pub fn is_empty(&self) -> bool {
        self.colorings.is_empty()
    }

    /// Columns of `dv` grouped by color, colors ascending.
    pub fn color_groups(&self, dv: &str) -> Option<BTreeMap<i64, Vec<usize>>> {
        let coloring = self.colorings.get(dv)?;
        let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (col, &color) in coloring.iter().enumerate() {
            groups.entry(color).or_default().push(col);
        }
        Some(groups)
    }

    /// Number of linear solves needed for `dv` in forward mode.
    ///
    /// Non-negative colors are solved once each; any negative entry is an
    /// ungrouped column and costs a solve of its own.
    pub fn num_colors(&self, dv: &str) -> Option<usize> {
        let coloring = self.colorings.get(dv)?;
        let negatives = coloring.iter().filter(|&&c| c < 0).count();
        let shared: BTreeSet<i64> = coloring.iter().copied().filter(|&c| c >= 0).collect();
        Some(negatives + shared.len())
    }

    /// The (rows, cols) pairs recorded for one response, variable and color.
    pub fn color_map(
        &self,
        res: &str,
        dv: &str,
        color: usize,
    ) -> Option<&(Vec<usize>, Vec<usize>)> {
        self.maps.get(res)?.get(dv)?.get(&color)
    }
}

impl From<ColoringParts> for SimulColoring {
    fn from((colorings, maps): ColoringParts) -> Self {
        Self { colorings, maps }
    }
}

impl From<SimulColoring> for ColoringParts {
    fn from(coloring: SimulColoring) -> Self {
        (coloring.colorings, coloring.maps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SimulColoring {
        let mut coloring = SimulColoring::default();
        coloring.colorings.insert("x".into(), vec![0, 0, 1, 2]);
        let mut per_dv = BTreeMap::new();
        let mut colors = ColorMap::new();
        colors.insert(0, (vec![0, 1], vec![0, 1]));
        per_dv.insert("x".to_string(), colors);
        coloring.maps.insert("f".into(), per_dv);
        coloring
    }

    #[test]
    fn serializes_as_two_element_array() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"[{"x":[0,0,1,2]},{"f":{"x":{"0":[[0,1],[0,1]]}}}]"#
        );
        let back: SimulColoring = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn color_groups_collect_columns() {
        let groups = sample().color_groups("x").unwrap();
        assert_eq!(groups[&0], vec![0, 1]);
        assert_eq!(groups[&2], vec![3]);
        assert!(sample().color_groups("missing").is_none());
    }

    #[test]
    fn num_colors_counts_negative_entries_individually() {
        let mut coloring = sample();
        assert_eq!(coloring.num_colors("x"), Some(3));
        coloring.colorings.insert("y".into(), vec![-1, 0, -1, 0]);
        assert_eq!(coloring.num_colors("y"), Some(3));
    }
}
