pub mod config;
pub mod credentials;
pub mod init;

pub use config::*;
pub use credentials::*;
