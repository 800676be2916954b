//! Domain types for the trade simulator

pub mod bar;
pub mod equity;
pub mod ids;
pub mod pnl;
pub mod position;
pub mod trade;

pub use bar::{Bar, BarError, BarSeries, EntryRequest, Signal, SignalIntent, UNLABELED_STRATEGY};
pub use equity::EquitySnapshot;
pub use ids::{IdGen, PositionId};
pub use pnl::{settle, Pricing, Settlement};
pub use position::{
    validate_levels, Direction, ExitReason, NewPosition, Position, PositionError, PositionStatus,
};
pub use trade::TradeRecord;
