use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bus error: {0}")]
    Bus(#[from] tidal_bus::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to publish {kind} message ({errors} error(s))")]
    Publish { kind: &'static str, errors: usize },

    #[error("Bus closed while {0}")]
    BusClosed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
