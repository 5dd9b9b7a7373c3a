// src/config/mod.rs
pub mod search;

pub use search::{FeedFormat, ProviderConfig, SearchConfig};
