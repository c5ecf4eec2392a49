//! Domain types: candles, series, timeframes, instrument profiles.

pub mod candle;
pub mod instrument;
pub mod timeframe;

pub use candle::{Candle, CandleSeries, Field, TimeBasis};
pub use instrument::{AssetClass, InstrumentProfile};
pub use timeframe::{Timeframe, TimeframeParseError};
