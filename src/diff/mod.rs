pub mod annotate;
pub mod differ;

pub use annotate::*;
pub use differ::*;
