//! # TradeKit
//!
//! An event-driven algorithmic trading engine. Strategies are driven through
//! a deterministic pipeline of market data, orders, fills and portfolio
//! state: historical simulation replays tick streams through a configurable
//! walk-the-book matching engine, while live trading runs the same engines
//! against external venues through pluggable adapters.
//!
//! ## Key features
//! - Price-level order book with order-level granularity and simulated
//!   walk-the-book fills.
//! - Deterministic matching with a seeded probabilistic fill model and
//!   partial fills.
//! - Single-threaded cooperative data and execution engines with a total
//!   message order per engine.
//! - A uniform clock: deterministic timer alerts in backtest, a background
//!   scheduler in live mode.
//! - Token-bucket throttling with queued pass-through.
//! - Self-describing tagged serialization of orders, commands and events.
//!
//! ## Feature flags
//!
//! `default` enables `backtest` and `live`.
//!
//! - `backtest`: the simulated venue, fill models and replay orchestrator.
//! - `live`: the tokio-backed live clock and node wiring.

/// Provides backtesting features: the simulated venue, fill models, the
/// replay orchestrator and reports.
#[cfg(feature = "backtest")]
pub mod backtest;

/// Provides the two-sided order book and its price ladders.
pub mod book;

/// Adapter capability contracts for market data and execution.
pub mod client;

/// Provides the uniform time source: test and live clocks, timers and
/// alerts.
pub mod clock;

/// The data and execution engines and their shared lifecycle.
pub mod engine;

/// Provides live trading node wiring.
#[cfg(feature = "live")]
pub mod live;

/// Message envelopes, data subscriptions, requests and responses.
pub mod message;

/// The domain model: value objects, identifiers, instruments, orders,
/// events, commands, positions and accounts.
pub mod model;

/// Self-describing tagged encoding of orders, commands and events.
pub mod serialization;

/// The persisted state store and recovery.
pub mod state;

/// The strategy interface driven by the engines.
pub mod strategy;

/// The token-bucket rate limiter.
pub mod throttler;

/// Provides common types.
pub mod prelude;
