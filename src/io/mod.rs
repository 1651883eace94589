pub mod knowledge_base;
pub mod traits;

pub use knowledge_base::*;
pub use traits::*;
