pub mod db;
pub mod models;
pub mod query;
pub mod schema;
pub mod time_serde;
pub mod writer;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
