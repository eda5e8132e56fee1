pub mod cli;
pub mod run;
pub mod summary;
pub mod sync;
