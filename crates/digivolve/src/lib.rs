pub mod fetcher;
pub mod parser;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod types;
pub mod utils;

pub use fetcher::{BrowserConfig, ChromeFetcher, FetchError, PageFetcher, with_browser};
pub use pipeline::{Pipeline, RunConfig, RunError, RunSummary, SkipReason};

/// Digimon index of the Digital Tamers 2 wiki. Entity pages live directly
/// below it.
pub const BASE_URL: &str = "https://www.grindosaur.com/en/games/digital-tamers-2/digimon";
