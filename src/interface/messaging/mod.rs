pub mod broker_client;
pub mod consumer;
pub mod relay;

pub use broker_client::{BrokerClient, BrokerState};
pub use consumer::PredictionConsumer;
pub use relay::PredictionRelay;
