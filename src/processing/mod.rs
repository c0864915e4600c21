//! # Processing Module
//!
//! The orchestrator and the seam to the optional advanced-feature collaborator.

pub mod advanced;
pub mod extractor;

pub use advanced::{AdvancedFeatureExtractor, AdvancedPreparer};
pub use extractor::{ExtractorStats, OptimizedFeatureExtractor};
