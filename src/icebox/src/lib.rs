pub mod cancel;
pub mod catalog;
pub mod convert;
pub mod error;
pub mod ident;
pub mod metadata;
pub mod spec;
pub mod storage;
pub mod table;

pub use cancel::CancelToken;
pub use catalog::{Catalog, PropertyUpdateSummary, TableCreateOptions};
pub use error::{Error, Result};
pub use ident::{NamespaceIdent, TableIdent};
pub use storage::FileIO;
pub use table::Table;
