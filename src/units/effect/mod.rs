mod gain;
mod mixer;
mod passthrough;

pub use gain::*;
pub use mixer::*;
pub use passthrough::*;
