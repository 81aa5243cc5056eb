pub mod memory;
pub mod types;

pub use memory::*;
pub use types::*;
