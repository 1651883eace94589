pub mod client;
pub mod extraction;
pub mod model;
pub mod normalize;
pub mod prompts;
pub mod streaming;

pub use client::*;
pub use extraction::*;
pub use model::*;
pub use normalize::*;
pub use prompts::*;
pub use streaming::*;
