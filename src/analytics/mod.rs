//! Derived statistics over fetched market data
//!
//! Everything here is pure: inputs are series and bars, outputs are numbers,
//! colors and labels ready for the report renderers.

pub mod breadth;
pub mod colors;
pub mod factors;
pub mod implied;
pub mod intraday;
pub mod stats;
pub mod true_range;
pub mod volatility;

pub use breadth::percent_above_sma;
pub use factors::{fit_factors, FactorFit, FitParams};
pub use implied::{Gauge, Insight};
pub use intraday::{intraday_zones, IntradayZones};
pub use true_range::{aggregate_daily, range_report, RangeReport, RangeStatus};
pub use volatility::{vol_and_mu, zs_5d, zs_live, VolStats};
