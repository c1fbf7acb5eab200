//! Domain types for ReplayLab.

pub mod bar;
pub mod equity;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod timeframe;
pub mod trade;

pub use bar::{first_unordered, Bar};
pub use equity::{equity_values, EquityPoint};
pub use ids::{PositionId, RunFingerprint};
pub use instrument::{SymbolSpec, SymbolTable};
pub use position::{levels_on_correct_side, pip_profit, Direction, Position};
pub use timeframe::{ParseTimeframeError, Timeframe};
pub use trade::{CloseReason, TradeRecord};
