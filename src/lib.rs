pub mod encoder;
pub mod resp;
pub mod parser;
pub mod connection;
pub mod config;
pub mod error;
pub mod types;
pub mod store;
pub mod enumerator;
pub mod resolver;
pub mod snapshot;
pub mod restorer;
pub mod inspector;
pub mod backup;
pub mod utils;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
