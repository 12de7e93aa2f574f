use thiserror::Error;
use tidal_types::CodecError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Producer error: {0}")]
    Producer(String),

    #[error("Topic creation error: {0}")]
    TopicCreation(String),

    #[error("Message bus is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
