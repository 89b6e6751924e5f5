use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://www.atcc.org";
pub const DB_PATH: &str = "data/atcc.sqlite";
pub const OUTPUT_DIR: &str = "output_data/cell_protocols";
pub const MERGED_FILE: &str = "output_data/cell_protocols.json";
pub const SKIP_LOG_FILE: &str = "output_data/skipped.json";

pub const FETCH_CONCURRENCY: usize = 4;
pub const FETCH_TIMEOUT_SECS: u64 = 10;
pub const MAX_RETRIES: u32 = 3;
pub const BASE_BACKOFF_MS: u64 = 2000;

/// Aggregate snapshot is rewritten after this many new records (and at the end).
pub const DEFAULT_FLUSH_EVERY: usize = 25;

/// CSS selectors for the product detail page.
pub mod selectors {
    pub const PRODUCT_NAME: &str = ".product-hero__name, h1";
    pub const CATALOG_NUMBER: &str = ".product-hero__catalog-number, [data-catalog-number]";
    pub const INFO_TITLE: &str = ".product-information__title";
    pub const INFO_DATA: &str = ".product-information__data";
    pub const IMAGE_GALLERY: &str = ".modal-image-gallery__open-modal img";
    pub const PRICE_CURRENT: &str = "span.product-pricing__current-price";
}

/// Base URL for absolutising relative links; `ATCC_BASE_URL` overrides the default.
pub fn base_url() -> String {
    std::env::var("ATCC_BASE_URL")
        .ok()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Where the pipeline reads and writes its artifacts.
#[derive(Debug, Clone)]
pub struct Paths {
    pub db: PathBuf,
    pub entry_dir: PathBuf,
    pub merged_file: PathBuf,
    pub skip_log: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            db: PathBuf::from(DB_PATH),
            entry_dir: PathBuf::from(OUTPUT_DIR),
            merged_file: PathBuf::from(MERGED_FILE),
            skip_log: PathBuf::from(SKIP_LOG_FILE),
        }
    }
}

impl Paths {
    /// All artifacts rooted under `out`, keeping the default file names.
    pub fn under(out: &Path) -> Self {
        Paths {
            db: PathBuf::from(DB_PATH),
            entry_dir: out.join("cell_protocols"),
            merged_file: out.join("cell_protocols.json"),
            skip_log: out.join("skipped.json"),
        }
    }
}
