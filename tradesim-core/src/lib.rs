//! TradeSim Core: domain types, sizers and the bar-by-bar simulation engine.
//!
//! This crate contains the heart of the trade simulator:
//! - Domain types (bars, signals, positions, trade records, equity snapshots)
//! - Exit evaluation with a configurable stop/target tie-break
//! - Admission control with capacity and risk circuit breakers
//! - Position sizers (fixed and quality/volatility-aware)
//! - The three-phase event loop and its ledger
//!
//! No I/O happens here; loading, reporting and export live in `tradesim-runner`.

pub mod domain;
pub mod engine;
pub mod sizers;
