pub mod generation;
pub mod ingest;
pub mod record;
pub mod script;

pub use generation::*;
pub use ingest::*;
pub use record::*;
pub use script::*;
