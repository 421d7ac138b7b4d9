//! Plain-data descriptors for resources, pipelines and swapchains.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX   = 1 << 0;
        const INDEX    = 1 << 1;
        const CONSTANT = 1 << 2;
        const STORAGE  = 1 << 3;
        const INDIRECT = 1 << 4;
        const COPY_SRC = 1 << 5;
        const COPY_DST = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED       = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const DEPTH_STENCIL = 1 << 2;
        const UAV           = 1 << 3;
        const COPY_SRC      = 1 << 4;
        const COPY_DST      = 1 << 5;
    }
}

/// Where a buffer lives relative to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CpuAccess {
    /// GPU-only; filled through a staging copy.
    #[default]
    None,
    /// Upload heap; written from the CPU every frame.
    Write,
    /// Readback heap.
    Read,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub cpu_access: CpuAccess,
    pub label: String,
}

impl BufferDesc {
    pub fn new(label: impl Into<String>, size: u64, usage: BufferUsage, cpu_access: CpuAccess) -> Self {
        Self { size, usage, cpu_access, label: label.into() }
    }

    pub fn upload(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self::new(label, size, usage, CpuAccess::Write)
    }

    pub fn gpu_only(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self::new(label, size, usage, CpuAccess::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    Unknown,
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    R16Uint,
    D32Float,
    D24UnormS8Uint,
}

impl Format {
    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }

    /// Size of one texel or vertex element in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R8Unorm => 1,
            Format::R16Uint => 2,
            Format::Rgba8Unorm
            | Format::Rgba8UnormSrgb
            | Format::Bgra8Unorm
            | Format::Bgra8UnormSrgb
            | Format::R32Float
            | Format::R32Uint
            | Format::D32Float
            | Format::D24UnormS8Uint => 4,
            Format::Rgba16Float | Format::Rg32Float => 8,
            Format::Rgb32Float => 12,
            Format::Rgba32Float => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    #[default]
    D2,
    D3,
    Cube,
    D2Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, layer count for arrays (6 for cubes).
    pub depth_or_layers: u32,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub format: Format,
    pub dimension: TextureDimension,
    pub usage: TextureUsage,
    pub label: String,
}

impl TextureDesc {
    pub fn d2(label: impl Into<String>, width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            width,
            height,
            depth_or_layers: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
            dimension: TextureDimension::D2,
            usage,
            label: label.into(),
        }
    }
}

/// Pipeline-usage phase of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Common,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    RenderTarget,
    DepthWrite,
    DepthRead,
    CopySource,
    CopyDest,
    Present,
    IndirectArgument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
    Geometry,
    Hull,
    Domain,
    Mesh,
    Amplification,
}

impl ShaderStage {
    pub fn default_entry_point(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VSMain",
            ShaderStage::Pixel => "PSMain",
            ShaderStage::Compute => "CSMain",
            ShaderStage::Geometry => "GSMain",
            ShaderStage::Hull => "HSMain",
            ShaderStage::Domain => "DSMain",
            ShaderStage::Mesh => "MSMain",
            ShaderStage::Amplification => "ASMain",
        }
    }

    /// Infers the stage from a file stem such as `terrain.vs`, `water_ps` or
    /// `blur.comp`. Falls back to vertex.
    pub fn from_path(path: &str) -> Self {
        let file = path.rsplit(['/', '\\']).next().unwrap_or(path).to_ascii_lowercase();
        let stem = file.strip_suffix(".wgsl").or_else(|| file.strip_suffix(".hlsl")).unwrap_or(&file);
        let tag = stem.rsplit(['.', '_']).next().unwrap_or(stem);
        match tag {
            "vs" | "vert" | "vertex" => ShaderStage::Vertex,
            "ps" | "frag" | "pixel" | "fs" => ShaderStage::Pixel,
            "cs" | "comp" | "compute" => ShaderStage::Compute,
            "gs" | "geom" => ShaderStage::Geometry,
            "hs" | "hull" | "tesc" => ShaderStage::Hull,
            "ds" | "domain" | "tese" => ShaderStage::Domain,
            "ms" | "mesh" => ShaderStage::Mesh,
            "as" | "task" | "amp" => ShaderStage::Amplification,
            _ => ShaderStage::Vertex,
        }
    }
}

/// Pre-compiled shader bytecode (SPIR-V words) for one stage.
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub stage: ShaderStage,
    pub entry_point: &'a str,
    pub bytecode: &'a [u32],
    pub label: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputRate {
    #[default]
    PerVertex,
    PerInstance,
}

/// One vertex attribute. Its shader location is its index in the layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic: &'static str,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub offset: u32,
    pub rate: InputRate,
    pub step_rate: u32,
}

impl InputElement {
    pub const fn per_vertex(semantic: &'static str, semantic_index: u32, format: Format, offset: u32) -> Self {
        Self { semantic, semantic_index, format, input_slot: 0, offset, rate: InputRate::PerVertex, step_rate: 0 }
    }

    pub const fn per_instance(semantic: &'static str, semantic_index: u32, format: Format, slot: u32, offset: u32) -> Self {
        Self { semantic, semantic_index, format, input_slot: slot, offset, rate: InputRate::PerInstance, step_rate: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub elements: Vec<InputElement>,
    /// Byte stride per input slot, indexed by slot.
    pub strides: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub fill: FillMode,
    pub cull: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip: bool,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill: FillMode::Solid,
            cull: CullMode::Back,
            front_counter_clockwise: true,
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            depth_clip: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareFunc,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self { depth_test: true, depth_write: true, compare: CompareFunc::Less }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    pub enabled: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub op: BlendOp,
}

impl BlendState {
    pub const OPAQUE: Self = Self { enabled: false, src: BlendFactor::One, dst: BlendFactor::Zero, op: BlendOp::Add };
    pub const ALPHA: Self =
        Self { enabled: true, src: BlendFactor::SrcAlpha, dst: BlendFactor::InvSrcAlpha, op: BlendOp::Add };
}

impl Default for BlendState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    pub fn size_bytes(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CommandListKind {
    #[default]
    Graphics,
    Compute,
    Copy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0.0, y: 0.0, width: width as f32, height: height as f32, min_depth: 0.0, max_depth: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub buffer_count: u32,
    pub vsync: bool,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self { width: 1280, height: 720, format: Format::Bgra8Unorm, buffer_count: 2, vsync: true }
    }
}
