pub mod assemble;
pub mod ingest;
pub mod multiplex;
pub mod pipeline;

pub use assemble::*;
pub use ingest::*;
pub use multiplex::*;
pub use pipeline::*;
