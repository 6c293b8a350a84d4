pub mod model;
pub mod repository;

pub use model::{InboundMessage, PredictionRecord, ResultRow, SendOutcome};
pub use repository::{
    DeliveryReport, InboundChannel, MessageListener, OutboundChannel, ResultStore,
};
