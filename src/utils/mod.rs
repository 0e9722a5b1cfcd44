pub mod glob;
pub mod sync;
