use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventcastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),
}
