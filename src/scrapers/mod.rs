pub mod browser;
pub mod dfimoveis;
pub mod fetch;
pub mod netimoveis;
pub mod paginate;
pub mod retry;
pub mod traits;
pub mod types;

pub use browser::BrowserFetcher;
pub use dfimoveis::DfImoveis;
pub use fetch::{HttpFetcher, PageFetcher};
pub use netimoveis::NetImoveis;
pub use paginate::Paginator;
pub use retry::RetryPolicy;
pub use traits::ListingSource;
pub use types::SearchParams;

/// Names accepted by `source_by_name`
pub const SOURCE_NAMES: &[&str] = &["dfimoveis", "netimoveis"];

pub fn source_by_name(name: &str) -> Option<Box<dyn ListingSource>> {
    match name.trim().to_lowercase().replace(['-', '_'], "").as_str() {
        "dfimoveis" => Some(Box::new(DfImoveis::new())),
        "netimoveis" => Some(Box::new(NetImoveis::new())),
        _ => None,
    }
}

/// Slugs in `requested` that `source` does not search by
pub fn unknown_property_types<'a>(
    source: &dyn ListingSource,
    requested: &'a [String],
) -> Vec<&'a str> {
    requested
        .iter()
        .map(String::as_str)
        .filter(|slug| !source.property_types().contains(slug))
        .collect()
}
