pub mod config;
pub mod result;
pub mod step;

pub use config::*;
pub use result::*;
pub use step::*;
