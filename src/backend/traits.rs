//! Core backend abstraction traits
//!
//! `ResourceFactory` creates device objects and `RenderContext` holds the
//! mutable binding state that stages and render items set and restore. The
//! pipeline only ever talks to these two traits.

use crate::backend::types::*;
use crate::BackendType;
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("R16_UInt is the only supported depth texture format. Requested: {0:?}")]
    UnsupportedDepthFormat(TextureFormat),
    #[error("Invalid slot:{slot}. Valid range:{}.", slot_range(.count))]
    InvalidSlot { kind: SlotKind, slot: u32, count: u32 },
    #[error("OpenGL and OpenGLES do not support shader bytecode. Active backend: {0}")]
    BytecodeUnsupported(BackendType),
    #[error("Invalid {kind} handle: {raw:#x}")]
    InvalidHandle { kind: &'static str, raw: u64 },
    #[error("Handle {raw:#x} belongs to render context #{owner}, not the active context #{active}")]
    StaleHandle { raw: u64, owner: u32, active: u32 },
    #[error("Cannot draw: {0}")]
    IncompleteDrawState(&'static str),
    #[error("Write of {len} bytes at offset {offset} overflows a buffer of {size} bytes")]
    BufferOverflow { size: u64, offset: u64, len: usize },
    #[error("Texture data has {actual} bytes, expected {expected}")]
    TextureDataSize { expected: usize, actual: usize },
    #[error("Failed to create resource: {0}")]
    ResourceCreationFailed(String),
}

fn slot_range(count: &u32) -> String {
    match count {
        0 => "none".to_string(),
        n => format!("0-{}", n - 1),
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Binding slot category used in slot validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    VertexBuffer,
    ConstantBuffer,
    Texture,
    Sampler,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotKind::VertexBuffer => "vertex buffer",
            SlotKind::ConstantBuffer => "constant buffer",
            SlotKind::Texture => "texture",
            SlotKind::Sampler => "sampler",
        };
        f.write_str(name)
    }
}

/// Identity of one render context instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Handle to a vertex, index or constant buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a device texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a texture bound for shader sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBindingHandle(pub(crate) u64);

/// Handle to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub(crate) u64);

/// Handle to a rasterizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizerStateHandle(pub(crate) u64);

/// Handle to a depth-stencil state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilStateHandle(pub(crate) u64);

/// Handle to a single shader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u64);

/// Handle to a linked vertex + fragment shader set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderSetHandle(pub(crate) u64);

/// Handle to the resource layout of a shader set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBindingSlotsHandle(pub(crate) u64);

impl ShaderSetHandle {
    /// Stable small identifier, used as a render-order tie-break
    pub fn id(&self) -> u32 {
        self.0 as u32
    }
}

/// Any device object, for destruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceObject {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    TextureBinding(TextureBindingHandle),
    Framebuffer(FramebufferHandle),
    Sampler(SamplerHandle),
    RasterizerState(RasterizerStateHandle),
    DepthStencilState(DepthStencilStateHandle),
    Shader(ShaderHandle),
    ShaderSet(ShaderSetHandle),
    ResourceBindingSlots(ResourceBindingSlotsHandle),
}

macro_rules! impl_device_object_from {
    ($($handle:ident => $variant:ident),* $(,)?) => {
        $(impl From<$handle> for DeviceObject {
            fn from(handle: $handle) -> Self {
                DeviceObject::$variant(handle)
            }
        })*
    };
}

impl_device_object_from!(
    BufferHandle => Buffer,
    TextureHandle => Texture,
    TextureBindingHandle => TextureBinding,
    FramebufferHandle => Framebuffer,
    SamplerHandle => Sampler,
    RasterizerStateHandle => RasterizerState,
    DepthStencilStateHandle => DepthStencilState,
    ShaderHandle => Shader,
    ShaderSetHandle => ShaderSet,
    ResourceBindingSlotsHandle => ResourceBindingSlots,
);

/// Shader set creation parameters
#[derive(Debug, Clone)]
pub struct ShaderSetDescriptor {
    pub vertex_inputs: Vec<VertexInputDescription>,
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
}

/// Device object creation.
///
/// Every call is synchronous and either returns a valid handle or a
/// descriptive error.
pub trait ResourceFactory {
    /// Which backend implements this factory
    fn backend_type(&self) -> BackendType;

    /// Create a buffer
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a buffer with initial data
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Write data to a buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8])
        -> BackendResult<()>;

    /// Create a texture.
    ///
    /// With [`TextureCreateOptions::DepthStencil`] the format must be
    /// [`TextureFormat::R16Uint`].
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Write the full top mip level of a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()>;

    /// Create an RGBA8 cubemap from six square faces
    fn create_cubemap_texture(
        &mut self,
        faces: &CubemapFaces<'_>,
        width: u32,
        height: u32,
    ) -> BackendResult<TextureHandle>;

    /// Create a binding that exposes a texture to shaders
    fn create_texture_binding(
        &mut self,
        texture: TextureHandle,
    ) -> BackendResult<TextureBindingHandle>;

    /// Create a framebuffer from color and/or depth attachments
    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle>;

    /// Create a sampler
    fn create_sampler_state(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle>;

    /// Create a rasterizer state
    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDescriptor,
    ) -> BackendResult<RasterizerStateHandle>;

    /// Create a depth-stencil state
    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilDescriptor,
    ) -> BackendResult<DepthStencilStateHandle>;

    /// Turn backend-specific shader source into shader code
    fn process_shader_code(
        &mut self,
        stage: ShaderStage,
        asset_name: &str,
    ) -> BackendResult<CompiledShaderCode>;

    /// Load precompiled shader bytecode
    fn load_processed_shader(&mut self, bytes: &[u8]) -> BackendResult<CompiledShaderCode>;

    /// Create a shader object
    fn create_shader(
        &mut self,
        stage: ShaderStage,
        code: &CompiledShaderCode,
    ) -> BackendResult<ShaderHandle>;

    /// Link a shader set
    fn create_shader_set(&mut self, desc: &ShaderSetDescriptor) -> BackendResult<ShaderSetHandle>;

    /// Declare the resources a shader set consumes, in slot order
    fn create_resource_binding_slots(
        &mut self,
        shader_set: ShaderSetHandle,
        resources: &[ShaderResourceDescription],
    ) -> BackendResult<ResourceBindingSlotsHandle>;

    /// Read back the top mip level of a texture
    fn read_texture_data(&mut self, texture: TextureHandle) -> BackendResult<TextureReadback>;

    /// Destroy a device object
    fn destroy(&mut self, object: DeviceObject);

    // Provided helpers

    /// Create a vertex buffer holding `vertices`
    fn create_vertex_buffer(&mut self, vertices: &[u8], label: &str) -> BackendResult<BufferHandle> {
        self.create_buffer_init(
            &BufferDescriptor {
                label: Some(label.to_string()),
                size: vertices.len() as u64,
                usage: BufferUsage::VERTEX,
            },
            vertices,
        )
    }

    /// Create a 16-bit index buffer
    fn create_index_buffer(&mut self, indices: &[u16], label: &str) -> BackendResult<BufferHandle> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        self.create_buffer_init(
            &BufferDescriptor {
                label: Some(label.to_string()),
                size: bytes.len() as u64,
                usage: BufferUsage::INDEX,
            },
            bytes,
        )
    }

    /// Create a dynamic constant buffer sized for `ty`
    fn create_constant_buffer(
        &mut self,
        ty: ShaderConstantType,
        label: &str,
    ) -> BackendResult<BufferHandle> {
        self.create_buffer(&BufferDescriptor {
            label: Some(label.to_string()),
            size: ty.size() as u64,
            usage: BufferUsage::CONSTANT | BufferUsage::DYNAMIC,
        })
    }
}

/// Mutable, stage-scoped device state.
///
/// Slot setters validate against the currently bound resource binding slots.
pub trait RenderContext {
    /// Identity of this context; handles are only valid on the context that created them
    fn context_id(&self) -> ContextId;

    /// Which backend implements this context
    fn backend_type(&self) -> BackendType;

    /// Factory for device objects owned by this context
    fn resource_factory(&mut self) -> &mut dyn ResourceFactory;

    /// Size of the default framebuffer
    fn window_size(&self) -> (u32, u32);

    /// Bind an offscreen framebuffer
    fn set_framebuffer(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()>;

    /// Bind the window's framebuffer
    fn set_default_framebuffer(&mut self);

    /// Currently bound offscreen framebuffer, `None` for the default one
    fn current_framebuffer(&self) -> Option<FramebufferHandle>;

    /// Color used by [`RenderContext::clear_buffer`]
    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clear color and depth of the bound framebuffer
    fn clear_buffer(&mut self) -> BackendResult<()>;

    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor_rectangle(&mut self, rect: ScissorRect);

    fn clear_scissor_rectangle(&mut self);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) -> BackendResult<()>;

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat)
        -> BackendResult<()>;

    fn set_shader_set(&mut self, shader_set: ShaderSetHandle) -> BackendResult<()>;

    fn set_resource_binding_slots(&mut self, slots: ResourceBindingSlotsHandle)
        -> BackendResult<()>;

    fn set_constant_buffer(&mut self, slot: u32, buffer: BufferHandle) -> BackendResult<()>;

    fn set_texture(&mut self, slot: u32, binding: TextureBindingHandle) -> BackendResult<()>;

    fn set_sampler_state(&mut self, slot: u32, sampler: SamplerHandle) -> BackendResult<()>;

    fn rasterizer_state(&self) -> RasterizerStateHandle;

    fn set_rasterizer_state(&mut self, state: RasterizerStateHandle) -> BackendResult<()>;

    fn depth_stencil_state(&self) -> DepthStencilStateHandle;

    fn set_depth_stencil_state(&mut self, state: DepthStencilStateHandle) -> BackendResult<()>;

    /// Depth-stencil state every stage starts with
    fn default_depth_stencil_state(&self) -> DepthStencilStateHandle;

    /// Shared point sampler owned by the context
    fn point_sampler(&self) -> SamplerHandle;

    /// Shared 4x anisotropic sampler owned by the context
    fn anisox4_sampler(&self) -> SamplerHandle;

    /// Draw `count` indices starting at `start_index`
    fn draw_indexed_primitives(&mut self, count: u32, start_index: u32) -> BackendResult<()>;

    /// Present the default framebuffer
    fn swap_buffers(&mut self) -> BackendResult<()>;

    /// Allow downcasting
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
