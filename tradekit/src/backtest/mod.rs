use thiserror::Error;

pub use engine::{BacktestDataContainer, BacktestEngine, BacktestEngineConfig, BacktestResults};
pub use matching::{MatchingEngine, MatchingEngineConfig};
pub use models::FillModel;
pub use report::{AccountReport, FillRecord, OrderFillsReport, PositionRecord, PositionsReport};

/// The replay orchestrator.
mod engine;
/// The simulated venue: walk-the-book fills against the instrument's book.
pub mod matching;
/// Probabilistic fill models.
pub mod models;
/// End-of-run reports.
pub mod report;

/// Errors that can occur while configuring or running a backtest.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("no instrument registered for {0}")]
    InstrumentNotFound(String),
    #[error("no data loaded for the run")]
    NoData,
}
