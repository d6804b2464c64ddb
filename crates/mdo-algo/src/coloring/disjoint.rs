//! Greedy grouping of structurally disjoint columns.

use mdo_core::{find_var_from_range, ResponseColorMaps};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::structure::SparsityStructure;

/// Disjoint column groups of one design variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesignVarGroups {
    pub name: String,
    pub size: usize,
    /// Group `i` has color `i`; offsets are relative to the variable and
    /// ascending within a group.
    pub groups: Vec<Vec<usize>>,
}

/// Result of [`find_disjoint`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisjointColumns {
    /// Every design variable of size > 1, in declaration order.
    pub design_vars: Vec<DesignVarGroups>,
    /// Response → design variable → color → (response rows, variable columns)
    /// for every structural nonzero of a grouped column.
    pub res_map: ResponseColorMaps,
}

/// Partition the columns of each design variable into groups whose row sets
/// are pairwise disjoint.
///
/// Columns with at least one disjoint partner are visited by descending
/// partner count, ties broken by column index. Each unassigned column starts
/// a group and absorbs, in ascending order, every unassigned partner that is
/// disjoint from the rows the group already covers. Columns with no partner
/// at all are left out of every group. Size-1 variables are skipped.
pub fn find_disjoint(structure: &SparsityStructure) -> DisjointColumns {
    let jac = &structure.jac;
    let mut out = DisjointColumns::default();

    for range in &structure.dv_ranges {
        if range.size() == 1 {
            continue;
        }

        let mut partners: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for c1 in range.indices() {
            for c2 in c1 + 1..=range.end {
                if jac.columns_disjoint(c1, c2) {
                    partners.entry(c1).or_default().insert(c2);
                    partners.entry(c2).or_default().insert(c1);
                }
            }
        }

        let mut candidates: Vec<(usize, BTreeSet<usize>)> = partners.into_iter().collect();
        candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut assigned = BTreeSet::new();
        let mut groups = Vec::new();
        for (leader, partners) in &candidates {
            if !assigned.insert(*leader) {
                continue;
            }
            let mut covered = jac.column(*leader).to_vec();
            let mut group = vec![*leader];
            for &other in partners {
                if assigned.contains(&other) {
                    continue;
                }
                let rows = jac.column(other);
                if covered.iter().zip(rows).any(|(&a, &b)| a && b) {
                    continue;
                }
                assigned.insert(other);
                group.push(other);
                for (acc, &row) in covered.iter_mut().zip(rows) {
                    *acc |= row;
                }
            }
            group.sort_unstable();
            groups.push(group);
        }

        for (color, group) in groups.iter().enumerate() {
            for &col in group {
                let dv_offset = col - range.start;
                for row in jac.column_rows(col) {
                    let Some((res, res_offset)) =
                        find_var_from_range(row, &structure.res_ranges)
                    else {
                        continue;
                    };
                    let entry = out
                        .res_map
                        .entry(res.to_string())
                        .or_default()
                        .entry(range.name.clone())
                        .or_default()
                        .entry(color)
                        .or_default();
                    entry.0.push(res_offset);
                    entry.1.push(dv_offset);
                }
            }
        }

        debug!(
            design_var = %range.name,
            groups = groups.len(),
            grouped_columns = assigned.len(),
            "found disjoint column groups"
        );
        out.design_vars.push(DesignVarGroups {
            name: range.name.clone(),
            size: range.size(),
            groups: groups
                .into_iter()
                .map(|group| group.into_iter().map(|col| col - range.start).collect())
                .collect(),
        });
    }

    out
}
