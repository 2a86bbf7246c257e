use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReefError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed sstable: {0}")]
    MalformedSstable(String),

    #[error("unexpected end of stream: {0}")]
    UnexpectedEof(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("gate closed")]
    GateClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReefError>;
