mod meter;
mod tap;

pub use meter::*;
pub use tap::*;
