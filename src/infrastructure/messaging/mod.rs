pub mod kafka;
pub mod producer;

pub use kafka::{KafkaInboundChannel, KafkaOutboundChannel};
pub use producer::PredictionProducer;
