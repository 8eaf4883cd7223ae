pub mod ids;
pub mod index;
