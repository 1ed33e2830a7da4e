pub mod coin_params;
pub mod engine_config;

pub use coin_params::{CoinParams, CoinParamsTable, StrategyVariant};
pub use engine_config::EngineConfig;
