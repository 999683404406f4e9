pub mod error;
pub mod sqlite;
pub mod traits;

pub use error::SqlError;
pub use sqlite::SqliteStore;
pub use traits::{Row, SqlStore, Statement, Value};
