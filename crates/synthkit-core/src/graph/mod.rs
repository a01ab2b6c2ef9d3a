pub mod cycle;
pub mod dag;
pub mod topo;

pub use topo::{resolve_order, GenerationOrder};
