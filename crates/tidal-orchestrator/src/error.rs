use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] tidal_store::Error),

    #[error("Bus error: {0}")]
    Bus(#[from] tidal_bus::Error),

    #[error("Failed to publish {kind} message: {errors} error(s), {enqueued} enqueued")]
    Publish {
        kind: &'static str,
        enqueued: usize,
        errors: usize,
    },

    #[error("Registration quorum not reached: {registered}/{required} driver(s) registered")]
    QuorumNotReached { registered: usize, required: usize },

    #[error("Bus closed while {0}")]
    BusClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
