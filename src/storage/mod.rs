//! Where records live: delimited files and workbooks on disk, and the
//! document store.

pub mod delimited;
pub mod documents;
pub mod workbook;

pub use delimited::DelimitedFile;
pub use documents::{DocumentStore, MongoStore};
