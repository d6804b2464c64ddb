pub mod coloring;
pub mod doe;
