//! Similarity metrics.

pub mod lncc;
pub mod trait_;

pub use lncc::LocalNormalizedCrossCorrelation;
pub use trait_::{Metric, NormalizationMode};
