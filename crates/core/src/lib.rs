pub mod config;
pub mod definition;
pub mod error;
pub mod instance;

pub use config::Config;
pub use definition::*;
pub use error::*;
pub use instance::*;
