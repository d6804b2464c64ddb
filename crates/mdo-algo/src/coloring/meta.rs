//! Building, writing and reading [`SimulColoring`]s.

use mdo_core::{ColorMap, MdoError, MdoResult, Problem, ResponseColorMaps, SimulColoring};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use super::disjoint::{find_disjoint, DisjointColumns};
use super::structure::{compute_structure, ColoringOptions};

const INDENT: &str = "   ";

/// Compute the simultaneous-derivative coloring of a problem.
///
/// When `stream` is given the coloring is also written to it in the
/// indented JSON layout of [`to_pretty_string`].
pub fn get_simul_meta(
    problem: &mut dyn Problem,
    options: &ColoringOptions,
    stream: Option<&mut dyn Write>,
) -> MdoResult<SimulColoring> {
    let structure = compute_structure(problem, options)?;
    let disjoint = find_disjoint(&structure);
    let coloring = simul_coloring_from_disjoint(&disjoint);

    let colored: usize = coloring.colorings.values().map(Vec::len).sum();
    let solves: usize = coloring
        .colorings
        .keys()
        .filter_map(|dv| coloring.num_colors(dv))
        .sum();
    info!(
        design_vars = coloring.colorings.len(),
        columns = colored,
        solves,
        "computed simultaneous derivative coloring"
    );

    if let Some(stream) = stream {
        write_coloring(&coloring, stream)?;
    }
    Ok(coloring)
}

/// Turn disjoint column groups into a full per-column coloring.
///
/// Grouped columns take their group's color. Every remaining column gets a
/// color of its own, numbered upward from the largest group color. Response
/// maps keep only colors that appear in some final coloring, and entries left
/// empty are dropped.
pub fn simul_coloring_from_disjoint(disjoint: &DisjointColumns) -> SimulColoring {
    let mut all_colors = BTreeSet::new();
    let mut colorings = BTreeMap::new();

    for dv in &disjoint.design_vars {
        let mut coloring = vec![-1_i64; dv.size];
        let mut max_color = -1_i64;
        for (color, cols) in dv.groups.iter().enumerate() {
            let color = color as i64;
            for &col in cols {
                coloring[col] = color;
            }
            all_colors.insert(color);
            max_color = max_color.max(color);
        }

        let mut next = max_color + 1;
        for entry in coloring.iter_mut().filter(|c| **c == -1) {
            *entry = next;
            all_colors.insert(next);
            next += 1;
        }
        colorings.insert(dv.name.clone(), coloring);
    }

    let mut maps = ResponseColorMaps::new();
    for (res, per_dv) in &disjoint.res_map {
        let mut kept = BTreeMap::new();
        for (dv, colors) in per_dv {
            let filtered: ColorMap = colors
                .iter()
                .filter(|(color, _)| all_colors.contains(&(**color as i64)))
                .map(|(color, entry)| (*color, entry.clone()))
                .collect();
            if !filtered.is_empty() {
                kept.insert(dv.clone(), filtered);
            }
        }
        if !kept.is_empty() {
            maps.insert(res.clone(), kept);
        }
    }

    SimulColoring { colorings, maps }
}

/// Write the coloring followed by a newline.
pub fn write_coloring(coloring: &SimulColoring, out: &mut dyn Write) -> MdoResult<()> {
    let text = to_pretty_string(coloring)?;
    out.write_all(text.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

pub fn save_coloring(coloring: &SimulColoring, path: &Path) -> MdoResult<()> {
    let mut file = fs::File::create(path)?;
    write_coloring(coloring, &mut file)
}

pub fn read_coloring<R: Read>(reader: R) -> MdoResult<SimulColoring> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn load_coloring(path: &Path) -> MdoResult<SimulColoring> {
    let file = fs::File::open(path)?;
    read_coloring(file).map_err(|err| match err {
        MdoError::Parse(msg) => MdoError::Parse(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// JSON text of `(simul_colorings, simul_maps)` indented three spaces per
/// level.
///
/// Objects put each key on its own line and arrays of objects put each
/// element on its own line. Arrays of scalars or arrays stay on one line, so
/// color arrays and row/column lists remain compact.
pub fn to_pretty_string(coloring: &SimulColoring) -> MdoResult<String> {
    let value = serde_json::to_value(coloring)?;
    let mut out = String::new();
    write_value(&value, 0, &mut out);
    Ok(out)
}

fn write_value(value: &Value, depth: usize, out: &mut String) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(depth + 1, out);
                out.push_str(&Value::String(key.clone()).to_string());
                out.push_str(": ");
                write_value(item, depth + 1, out);
            }
            out.push('\n');
            push_indent(depth, out);
            out.push('}');
        }
        Value::Array(items) if items.iter().any(is_nonempty_object) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('\n');
                push_indent(depth + 1, out);
                write_value(item, depth + 1, out);
            }
            out.push('\n');
            push_indent(depth, out);
            out.push(']');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, depth, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn is_nonempty_object(value: &Value) -> bool {
    value.as_object().is_some_and(|map| !map.is_empty())
}

fn push_indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}
