pub mod checkpoint;
pub mod cleaner;
pub mod details;
pub mod merge;
pub mod process;
pub mod scrape;
pub mod transform;

pub use details::DetailJob;
pub use process::{FinalOutputs, ProcessJob, ProcessOptions};
pub use scrape::ScrapeJob;
