use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("at least one frame is required")]
    NoFrames,

    #[error("canvas dimensions cannot be zero")]
    ZeroDimension,

    #[error("dimensions {width}x{height} exceed the GIF limit of 65535")]
    DimensionOverflow { width: usize, height: usize },

    #[error("frame {frame} has {len} pixels, expected {width}x{height}")]
    DimensionMismatch {
        frame: usize,
        len: usize,
        width: usize,
        height: usize,
    },

    #[error("got {delays} delays for {frames} frames")]
    DelayCountMismatch { delays: usize, frames: usize },

    #[error("sample_factor must be between 1 and 30, got {0}")]
    InvalidSampleFactor(u32),
}
