/// Tile-based pixel pipeline
/// Setup, binning and shading of 16-lane triangle groups into Morton-ordered textures
pub mod blend;
pub mod context;
pub mod interpolation;
pub mod morton;
pub mod rasterizer;
pub mod shader;
pub mod texture;
pub mod tile;

pub use blend::{BlendFactor, BlendOp, BlendState, ColorWriteMask};
pub use context::{DepthStencilState, DrawStats, GraphicsContext, PixelTask, ScissorRect};
pub use interpolation::InterpolationContext;
pub use morton::MortonStrategy;
pub use rasterizer::{
    CullMode, QuadQuadFragment, RasterState, Rasterizer, TriangleData, TriangleEdges, TriangleLanes,
    TriangleSetup, Viewport,
};
pub use shader::{PixelInput, PixelOutput, PixelShader, SolidColorShader, VertexColorShader};
pub use texture::{ColorLanes, Texture, TextureFormat, TextureWriter};
pub use tile::{PixelRect, TileCoord, TileRange, TILE_SIZE};
