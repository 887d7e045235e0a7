use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(#[source] lapin::Error),

    #[error("topology declaration failed: {0}")]
    Topology(#[source] lapin::Error),

    #[error("publish failed: {0}")]
    Publish(#[source] lapin::Error),

    #[error("publish did not confirm within the deadline")]
    PublishTimeout,

    #[error("consume failed: {0}")]
    Consume(#[source] lapin::Error),

    #[error("ack/nack failed: {0}")]
    Ack(#[source] lapin::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
