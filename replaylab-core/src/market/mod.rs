//! Market context for exit decisions: regime and trading session.

pub mod regime;
pub mod session;

pub use regime::{MarketRegime, RegimeDetector, RegimeReading};
pub use session::TradingSession;
