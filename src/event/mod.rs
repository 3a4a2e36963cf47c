pub mod run_outcome;

pub use run_outcome::*;
