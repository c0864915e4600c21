//! # Configuration Module
//!
//! This module provides the configuration structures for the extractor, its cache and its
//! logging, together with human-friendly duration parsing for the command line.

pub mod config;

pub use config::{
    parse_duration, CacheConfig, ExtractorConfig, KeyScheme, LogOutput, LoggingConfig,
};
