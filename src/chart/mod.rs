pub mod engine;
pub mod price_process;
pub mod series;

// Re-export the chart types for convenient access (e.g. `use crate::chart::Candle`).
pub use engine::{run_chart_loop, ChartEngine, ChartSnapshot};
pub use price_process::{PricePoint, PriceProcess};
pub use series::{Candle, CandleSeries};
