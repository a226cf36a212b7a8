//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

use crate::BackendType;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba32Float,
    Rgba8Unorm,
    Bgra8Unorm,
    R8Uint,
    R16Uint,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Uint => 1,
            TextureFormat::R16Uint => 2,
            TextureFormat::Rgba8Unorm | TextureFormat::Bgra8Unorm => 4,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Name of the format the given backend actually allocates.
    pub fn native_name(&self, backend: BackendType, options: TextureCreateOptions) -> &'static str {
        let depth = options == TextureCreateOptions::DepthStencil;
        match (self, backend) {
            (TextureFormat::R16Uint, BackendType::Direct3D11) if depth => "D16_UNorm",
            (TextureFormat::R16Uint, BackendType::Vulkan) if depth => "D16Unorm",
            (TextureFormat::R16Uint, BackendType::OpenGL | BackendType::OpenGLES) if depth => {
                "DepthComponent16"
            }
            (TextureFormat::R16Uint, BackendType::Vulkan) => "R16Uint",
            (TextureFormat::R16Uint, BackendType::Direct3D11) => "R16_UInt",
            (TextureFormat::R16Uint, _) => "R16ui",
            (TextureFormat::R8Uint, BackendType::Direct3D11) => "R8_UInt",
            (TextureFormat::R8Uint, BackendType::Vulkan) => "R8Uint",
            (TextureFormat::R8Uint, _) => "R8ui",
            (TextureFormat::Rgba8Unorm, BackendType::Direct3D11) => "R8G8B8A8_UNorm",
            (TextureFormat::Rgba8Unorm, BackendType::Vulkan) => "R8G8B8A8Unorm",
            (TextureFormat::Rgba8Unorm, _) => "Rgba8",
            (TextureFormat::Bgra8Unorm, BackendType::Direct3D11) => "B8G8R8A8_UNorm",
            (TextureFormat::Bgra8Unorm, BackendType::Vulkan) => "B8G8R8A8Unorm",
            (TextureFormat::Bgra8Unorm, _) => "Bgra8",
            (TextureFormat::Rgba32Float, BackendType::Direct3D11) => "R32G32B32A32_Float",
            (TextureFormat::Rgba32Float, BackendType::Vulkan) => "R32G32B32A32Sfloat",
            (TextureFormat::Rgba32Float, _) => "Rgba32f",
        }
    }
}

/// How a texture will be used by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureCreateOptions {
    #[default]
    None,
    RenderTarget,
    DepthStencil,
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const VERTEX: Self = Self(1 << 0);
    pub const INDEX: Self = Self(1 << 1);
    pub const CONSTANT: Self = Self(1 << 2);
    pub const DYNAMIC: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub options: TextureCreateOptions,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            options: TextureCreateOptions::None,
        }
    }
}

impl TextureDescriptor {
    /// Size in bytes of the top mip level
    pub fn byte_size(&self) -> usize {
        (self.width * self.height * self.format.bytes_per_pixel()) as usize
    }
}

/// Texture data of a readback, tightly packed rows
#[derive(Debug, Clone)]
pub struct TextureReadback {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl TextureReadback {
    /// Interprets the readback as 16-bit texels.
    pub fn to_u16(&self) -> Vec<u16> {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// Framebuffer attachments
#[derive(Debug, Clone, Copy, Default)]
pub struct FramebufferDescriptor {
    pub color: Option<crate::backend::TextureHandle>,
    pub depth: Option<crate::backend::TextureHandle>,
}

/// Six faces of a cubemap, each `width * height` RGBA8 texels
#[derive(Debug, Clone, Copy)]
pub struct CubemapFaces<'a> {
    pub front: &'a [u8],
    pub back: &'a [u8],
    pub left: &'a [u8],
    pub right: &'a [u8],
    pub top: &'a [u8],
    pub bottom: &'a [u8],
}

impl<'a> CubemapFaces<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> {
        [self.front, self.back, self.left, self.right, self.top, self.bottom].into_iter()
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexElementFormat {
    Float1,
    Float2,
    Float3,
    Float4,
}

impl VertexElementFormat {
    pub fn size(&self) -> u32 {
        match self {
            VertexElementFormat::Float1 => 4,
            VertexElementFormat::Float2 => 8,
            VertexElementFormat::Float3 => 12,
            VertexElementFormat::Float4 => 16,
        }
    }
}

/// Semantic of a vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSemantic {
    Position,
    Normal,
    TextureCoordinate,
    Color,
}

/// Vertex attribute description
#[derive(Debug, Clone)]
pub struct VertexInputElement {
    pub name: &'static str,
    pub semantic: VertexSemantic,
    pub format: VertexElementFormat,
}

impl VertexInputElement {
    pub const fn new(
        name: &'static str,
        semantic: VertexSemantic,
        format: VertexElementFormat,
    ) -> Self {
        Self { name, semantic, format }
    }
}

/// Layout of one vertex buffer slot
#[derive(Debug, Clone)]
pub struct VertexInputDescription {
    pub stride: u32,
    pub elements: Vec<VertexInputElement>,
}

impl VertexInputDescription {
    pub fn new(stride: u32, elements: Vec<VertexInputElement>) -> Self {
        Self { stride, elements }
    }

    /// Sum of element sizes, which must not exceed the stride
    pub fn packed_size(&self) -> u32 {
        self.elements.iter().map(|e| e.format.size()).sum()
    }
}

/// Position, normal and texture coordinate vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPositionNormalTexture {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl VertexPositionNormalTexture {
    pub const SIZE_IN_BYTES: u32 = 32;

    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self { position, normal, uv }
    }

    pub fn layout() -> VertexInputDescription {
        VertexInputDescription::new(
            Self::SIZE_IN_BYTES,
            vec![
                VertexInputElement::new(
                    "in_position",
                    VertexSemantic::Position,
                    VertexElementFormat::Float3,
                ),
                VertexInputElement::new(
                    "in_normal",
                    VertexSemantic::Normal,
                    VertexElementFormat::Float3,
                ),
                VertexInputElement::new(
                    "in_texCoord",
                    VertexSemantic::TextureCoordinate,
                    VertexElementFormat::Float2,
                ),
            ],
        )
    }
}

/// Position and texture coordinate vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPositionTexture {
    pub position: Vec3,
    pub uv: Vec2,
}

impl VertexPositionTexture {
    pub const SIZE_IN_BYTES: u32 = 20;

    pub fn new(position: Vec3, uv: Vec2) -> Self {
        Self { position, uv }
    }

    pub fn layout() -> VertexInputDescription {
        VertexInputDescription::new(
            Self::SIZE_IN_BYTES,
            vec![
                VertexInputElement::new(
                    "in_position",
                    VertexSemantic::Position,
                    VertexElementFormat::Float3,
                ),
                VertexInputElement::new(
                    "in_texCoord",
                    VertexSemantic::TextureCoordinate,
                    VertexElementFormat::Float2,
                ),
            ],
        )
    }
}

/// Position and color vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPositionColor {
    pub position: Vec3,
    pub color: [f32; 4],
}

impl VertexPositionColor {
    pub const SIZE_IN_BYTES: u32 = 28;

    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position,
            color: color.to_array(),
        }
    }

    pub fn layout() -> VertexInputDescription {
        VertexInputDescription::new(
            Self::SIZE_IN_BYTES,
            vec![
                VertexInputElement::new(
                    "in_position",
                    VertexSemantic::Position,
                    VertexElementFormat::Float3,
                ),
                VertexInputElement::new("in_color", VertexSemantic::Color, VertexElementFormat::Float4),
            ],
        )
    }
}

/// Position-only vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPosition {
    pub position: Vec3,
}

impl VertexPosition {
    pub const SIZE_IN_BYTES: u32 = 12;

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
        }
    }

    pub fn layout() -> VertexInputDescription {
        VertexInputDescription::new(
            Self::SIZE_IN_BYTES,
            vec![VertexInputElement::new(
                "in_position",
                VertexSemantic::Position,
                VertexElementFormat::Float3,
            )],
        )
    }
}

/// Index buffer element size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn suffix(&self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Shader code ready to be turned into a shader object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledShaderCode {
    Source { stage: ShaderStage, name: String },
    Bytecode { len: usize },
}

/// Constant data types a shader can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderConstantType {
    Float1,
    Float2,
    Float4,
    Matrix4x4,
    Custom(u32),
}

impl ShaderConstantType {
    pub fn size(&self) -> u32 {
        match self {
            ShaderConstantType::Float1 => 4,
            ShaderConstantType::Float2 => 8,
            ShaderConstantType::Float4 => 16,
            ShaderConstantType::Matrix4x4 => 64,
            ShaderConstantType::Custom(size) => *size,
        }
    }
}

/// Kind of resource bound through a binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderResourceType {
    ConstantBuffer(ShaderConstantType),
    Texture,
}

/// A named resource a shader set expects
#[derive(Debug, Clone)]
pub struct ShaderResourceDescription {
    pub name: &'static str,
    pub ty: ShaderResourceType,
}

impl ShaderResourceDescription {
    pub const fn constant(name: &'static str, ty: ShaderConstantType) -> Self {
        Self {
            name,
            ty: ShaderResourceType::ConstantBuffer(ty),
        }
    }

    pub const fn texture(name: &'static str) -> Self {
        Self {
            name,
            ty: ShaderResourceType::Texture,
        }
    }
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Triangle fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    Solid,
    Wireframe,
}

/// Rasterizer state descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizerDescriptor {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub depth_clip: bool,
    pub scissor_test: bool,
}

impl Default for RasterizerDescriptor {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            depth_clip: true,
            scissor_test: false,
        }
    }
}

/// Compare function for depth tests and comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth-stencil state descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDescriptor {
    pub depth_enabled: bool,
    pub depth_compare: CompareFunction,
    pub depth_write: bool,
}

impl Default for DepthStencilDescriptor {
    fn default() -> Self {
        Self {
            depth_enabled: true,
            depth_compare: CompareFunction::LessEqual,
            depth_write: true,
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerFilter {
    MinMagMipPoint,
    MinMagMipLinear,
    Anisotropic,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Sampler descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub filter: SamplerFilter,
    pub max_anisotropy: u32,
    pub border_color: [f32; 4],
    pub compare: CompareFunction,
    pub min_lod: i32,
    pub max_lod: i32,
    pub lod_bias: i32,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::Wrap,
            address_mode_v: AddressMode::Wrap,
            address_mode_w: AddressMode::Wrap,
            filter: SamplerFilter::MinMagMipLinear,
            max_anisotropy: 1,
            border_color: [0.0, 0.0, 0.0, 0.0],
            compare: CompareFunction::Never,
            min_lod: 0,
            max_lod: i32::MAX,
            lod_bias: 0,
        }
    }
}

impl SamplerDescriptor {
    pub fn point() -> Self {
        Self {
            label: Some("point".into()),
            filter: SamplerFilter::MinMagMipPoint,
            ..Default::default()
        }
    }

    pub fn anisotropic(max_anisotropy: u32) -> Self {
        Self {
            label: Some(format!("aniso{max_anisotropy}x")),
            filter: SamplerFilter::Anisotropic,
            max_anisotropy,
            ..Default::default()
        }
    }

    /// Border-addressed point sampler with a white border, so texels outside
    /// the shadow map read as fully lit.
    pub fn shadow_map() -> Self {
        Self {
            label: Some("shadow_map".into()),
            address_mode_u: AddressMode::Border,
            address_mode_v: AddressMode::Border,
            address_mode_w: AddressMode::Border,
            filter: SamplerFilter::MinMagMipPoint,
            max_anisotropy: 1,
            border_color: [1.0, 1.0, 1.0, 1.0],
            compare: CompareFunction::Always,
            min_lod: 0,
            max_lod: i32::MAX,
            lod_bias: 0,
        }
    }
}
