pub mod contacts;
pub mod db;
pub mod models;
pub mod qdrant;
pub mod query_cache;
pub mod schema;
pub mod sessions;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
