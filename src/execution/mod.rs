// Market data, position lifecycle and execution
pub mod actions;
pub mod bar_buffer;
pub mod controller;
pub mod engine;
pub mod market_data;
pub mod paper;
pub mod position_manager;
pub mod runtime;
pub mod synthetic_feed;
pub mod venue;

pub use actions::{
    CreateExecutorAction, CycleActions, ExecutorConfig, ExecutorEvent, ExecutorUpdate,
    StopExecutorAction,
};
pub use bar_buffer::BarBuffer;
pub use controller::{position_size, PositionLifecycleController, SignalSource};
pub use engine::Engine;
pub use market_data::MarketDataProvider;
pub use paper::PaperExecutor;
pub use position_manager::{Position, PositionManager, PositionStatus};
pub use runtime::ExecutorRuntime;
pub use synthetic_feed::SyntheticFeed;
pub use venue::{NoopVenueSetup, VenueSetup};
