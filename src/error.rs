//! Error types shared by the rendering pipeline.

use thiserror::Error;

use crate::window::PixelWindow;

/// Boxed error returned by decoder collaborators.
pub type AnyResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid provider or render configuration, raised when the provider opens.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("band {band} is outside the raster's {samples} sample(s)")]
    BandOutOfRange { band: usize, samples: usize },

    #[error("unsupported projection type: EPSG:{epsg}, please supply a projection")]
    UnsupportedCrs { epsg: u32 },

    #[error("expression error at offset {offset}: {message}")]
    Expression { offset: usize, message: String },

    #[error("failed to decode level {level} window {window:?}")]
    Decode {
        level: usize,
        window: PixelWindow,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to open raster: {0}")]
    Open(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("GPU surface error: {0}")]
    Gpu(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("provider has been destroyed")]
    Destroyed,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// True for failures that only affect a single tile request.
    #[must_use]
    pub fn is_tile_local(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::Worker(_) | Error::Gpu(_))
    }
}
