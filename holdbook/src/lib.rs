pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod expand;
pub mod ledger;
pub mod rest;
pub mod session;
pub mod types;

// ---- Top-level re-exports for ergonomic usage ----

// Config + errors
pub use config::HoldbookConfig;
pub use error::{HoldbookError, Result};

// Snapshot decoding
pub use ledger::{decode, normalize, ExchangeLadders, HighlightTier, PriceLevelRow, PriceSize};

// Ledger comparison
pub use diff::{
    active_level_count, aligned_rows, is_heavily_traded, traded_diff, AlignedRow, LedgerDiffRow,
    DEFAULT_HEAVY_THRESHOLD,
};

// Previous-record cache + view controller
pub use cache::{FetchFuture, FetchPreviousFn, RecordCache};
pub use expand::{ExpandController, Expanded, PrefetchSummary};

// REST client + session
pub use rest::HoldbookHttpClient;
pub use session::SessionContext;

// Wire types
pub use types::{
    ApiResponse, HoldPage, HoldRow, LastPriceEntry, PreviousQuery, PreviousRecord, TimeWindow,
};
