pub mod brevo;
pub mod notifier;

pub use brevo::*;
pub use notifier::*;
