mod mirror;
mod sync_engine;

pub use mirror::*;
pub use sync_engine::*;
