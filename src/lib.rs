/// Tile Raster - CPU triangle rasterizer working on 16 lanes at a time
/// Built from small, separately benchmarkable pipeline stages
pub mod error;
pub mod jobs;
pub mod lanes;
pub mod mesh;
pub mod perf;
pub mod rendering;

pub use error::{DrawError, DrawResult, SchedulerError, TextureError};
pub use jobs::{JobScheduler, ParallelScheduler, SchedulerConfig, SequentialScheduler};
pub use lanes::{F32x16, Mask16, SimdLevel, U32x16, LANES};
pub use mesh::{IndexLayout, MeshData, SpanMesh};
pub use perf::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};
pub use rendering::{
    BlendFactor, BlendOp, BlendState, ColorLanes, ColorWriteMask, CullMode, DepthStencilState,
    DrawStats, GraphicsContext, PixelInput, PixelOutput, PixelShader, RasterState, ScissorRect,
    SolidColorShader, Texture, TextureFormat, VertexColorShader, Viewport,
};
