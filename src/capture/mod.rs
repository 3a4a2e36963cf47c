pub mod capturer;
pub mod chrome;

pub use capturer::*;
pub use chrome::*;
