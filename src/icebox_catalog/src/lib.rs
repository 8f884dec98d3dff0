mod json;
mod sqlite;
mod validate;

pub use json::json_catalog::JsonCatalog;
pub use sqlite::sqlite_catalog::SqliteCatalog;
