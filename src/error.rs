use thiserror::Error;

use crate::rendering::texture::TextureFormat;

/// Contract violations detected by `GraphicsContext::draw` before any work is
/// scheduled.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DrawError {
    #[error("index count {0} is not a multiple of 3")]
    IndexCountNotTriangles(usize),
    #[error("planar index arrays differ in length (a={a}, b={b}, c={c})")]
    IndexLengthMismatch { a: usize, b: usize, c: usize },
    #[error("index arrays hold {available} triangles but {required} were requested")]
    IndexArraysTooShort { required: usize, available: usize },
    #[error("vertex index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("{attribute} holds {available} vertices but positions hold {required}")]
    AttributeTooShort {
        attribute: &'static str,
        required: usize,
        available: usize,
    },
    #[error("viewport {width}x{height} is degenerate")]
    DegenerateViewport { width: f32, height: f32 },
    #[error("depth range [{min}, {max}] is invalid")]
    InvalidDepthRange { min: f32, max: f32 },
    #[error("scissor rectangle is empty")]
    EmptyScissor,
    #[error("render target format {0:?} cannot be drawn to")]
    UnsupportedTarget(TextureFormat),
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

/// Capability errors raised by texture operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TextureError {
    #[error("{op} is not supported by {format:?} textures")]
    UnsupportedFormat {
        op: &'static str,
        format: TextureFormat,
    },
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

pub type DrawResult<T> = Result<T, DrawError>;

/// Failure to start a dedicated worker pool.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
