//! # Core Pipeline Module
//!
//! The compute path of one extraction: partition the image, sample every region on the
//! worker pool, and merge the partial results into one feature vector.

pub mod features;
pub mod merger;
pub mod partition;
pub mod worker_pool;
