//! Design variable and response declarations, plus the inclusive offset
//! ranges that place them inside a total jacobian.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, sized optimization input.
///
/// The flattened values of a design variable occupy a contiguous block of
/// columns in the total jacobian. Bounds are scalars applied to every entry;
/// case generators that sample the design space require them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignVarMeta {
    pub name: String,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl DesignVarMeta {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            lower: None,
            upper: None,
        }
    }

    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    /// Both bounds, when declared.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) => Some((lower, upper)),
            _ => None,
        }
    }
}

/// Whether a response is an objective or a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseKind {
    Objective,
    Constraint {
        #[serde(default)]
        linear: bool,
    },
}

/// A named, sized optimization output whose values form a contiguous block
/// of rows in the total jacobian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub name: String,
    pub size: usize,
    pub kind: ResponseKind,
}

impl ResponseMeta {
    pub fn objective(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            kind: ResponseKind::Objective,
        }
    }

    pub fn constraint(name: impl Into<String>, size: usize, linear: bool) -> Self {
        Self {
            name: name.into(),
            size,
            kind: ResponseKind::Constraint { linear },
        }
    }

    pub fn is_objective(&self) -> bool {
        matches!(self.kind, ResponseKind::Objective)
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.kind, ResponseKind::Constraint { linear: true })
    }
}

/// Inclusive `[start, end]` block of a total jacobian owned by one variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarRange {
    pub start: usize,
    pub end: usize,
    pub name: String,
}

impl VarRange {
    pub fn size(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.start <= idx && idx <= self.end
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

impl fmt::Display for VarRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}..={}]", self.name, self.start, self.end)
    }
}

/// Lay out named blocks back to back in declaration order.
///
/// Zero-sized entries are skipped since they own no rows or columns.
pub fn offset_ranges<'a, I>(items: I) -> Vec<VarRange>
where
    I: IntoIterator<Item = (&'a str, usize)>,
{
    let mut ranges = Vec::new();
    let mut start = 0;
    for (name, size) in items {
        if size == 0 {
            continue;
        }
        ranges.push(VarRange {
            start,
            end: start + size - 1,
            name: name.to_string(),
        });
        start += size;
    }
    ranges
}

/// Map a global index back to its owning variable and the local offset.
///
/// `ranges` must be sorted and contiguous, as produced by [`offset_ranges`].
pub fn find_var_from_range(idx: usize, ranges: &[VarRange]) -> Option<(&str, usize)> {
    let pos = ranges.partition_point(|range| range.end < idx);
    ranges
        .get(pos)
        .filter(|range| range.contains(idx))
        .map(|range| (range.name.as_str(), idx - range.start))
}
