pub mod features;
pub mod record;

pub use features::*;
pub use record::*;
