// Risk barrier module
pub mod barrier;

pub use barrier::{
    build_barrier, pnl_pct, CloseType, OrderType, RiskBarrierSpec, RiskConfig, TakeProfitSource,
    TrailingStop, TrailingTracker, DYNAMIC_TAKE_PROFIT_METRIC,
};
