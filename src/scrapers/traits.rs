use crate::models::Property;
use crate::scrapers::types::SearchParams;

/// Common trait for every listing site.
///
/// A source only knows its URLs and its markup; fetching, retries, batching
/// and checkpointing are shared by all of them.
pub trait ListingSource: Send + Sync {
    /// Short name used in logs and output file names
    fn source_name(&self) -> &'static str;

    /// URL of one results page (pages start at 1)
    fn page_url(&self, params: &SearchParams, page: usize) -> String;

    /// Listings found on a results page; an empty vector means the page is empty
    fn parse_listings(&self, html: &str, params: &SearchParams) -> Vec<Property>;

    /// Whether results only appear after client-side rendering
    fn requires_browser(&self) -> bool {
        false
    }

    /// Long description from a listing's detail page, when the site has one
    fn parse_detail_description(&self, _html: &str) -> Option<String> {
        None
    }

    /// Category slugs the site understands
    fn property_types(&self) -> &'static [&'static str];
}
