//! Configuration module for Shelfwatch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use shelfwatch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("shelfwatch.toml")).unwrap();
//! println!("Fetching with {} workers", config.crawler.max_concurrent_fetches);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CatalogConfig, Config, CrawlerConfig, OutputConfig, RetryConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
