mod linear;
mod metrics;
mod scaler;

pub use linear::*;
pub use metrics::*;
pub use scaler::*;
