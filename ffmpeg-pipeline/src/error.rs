//! Error taxonomy shared by every stage of the pipeline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported codec/container, invalid dimensions or time base.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Frame/conversion buffers or the output resource could not be acquired.
    #[error("resource error: {0}")]
    Resource(String),
    /// The encoder rejected a frame or misbehaved while flushing.
    #[error("encode error: {0}")]
    Encode(String),
    /// Operation invoked in the wrong lifecycle state.
    #[error("state error: {0}")]
    State(String),
    /// Write or flush failure on the container.
    #[error("io error: {0}")]
    Io(String),
    /// Trailer/close failed after every packet was already written.
    #[error("finalize error: {0}")]
    Finalize(Box<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    pub fn finalize(source: Error) -> Self {
        Self::Finalize(Box::new(source))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    pub fn is_encode(&self) -> bool {
        matches!(self, Self::Encode(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    pub fn is_finalize(&self) -> bool {
        matches!(self, Self::Finalize(_))
    }
}
