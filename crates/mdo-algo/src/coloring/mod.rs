//! Simultaneous-derivative coloring.
//!
//! The pipeline runs leaf first:
//!
//! 1. [`probe`]: random probe values replace every partial while the
//!    structure is analysed
//! 2. [`structure`]: accumulate, normalize and threshold the probed totals
//! 3. [`disjoint`]: group row-disjoint columns of each design variable
//! 4. [`meta`]: turn the groups into a persistable [`mdo_core::SimulColoring`]
//! 5. [`summary`]: report colors against sizes

pub mod disjoint;
pub mod meta;
pub mod probe;
pub mod structure;
pub mod summary;

pub use disjoint::{find_disjoint, DesignVarGroups, DisjointColumns};
pub use meta::{
    get_simul_meta, load_coloring, read_coloring, save_coloring, simul_coloring_from_disjoint,
    to_pretty_string, write_coloring,
};
pub use probe::{ProbeScope, SparsityProbe};
pub use structure::{
    compute_structure, sparsity_responses, ColoringOptions, SparsityStructure, StructuralJacobian,
};
pub use summary::{simul_coloring_summary, ColoringSummary, DesignVarColors};
