pub mod indicators;

mod analyzer;

pub use analyzer::TechnicalAnalysisEngine;
