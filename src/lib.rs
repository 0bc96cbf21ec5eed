pub mod cli;
pub mod db;
pub mod migration;

pub use cli::error::PloverError;
pub use migration::{Definition, MigrationError, Registry};
