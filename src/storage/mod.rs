mod schema;
mod session_store;
mod sessions;
mod types;

pub use schema::{Database, IN_MEMORY};
pub use session_store::{SqliteSessionStore, SESSION_MAX_AGE};
pub use types::DatabaseError;
