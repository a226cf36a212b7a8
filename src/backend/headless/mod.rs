//! Headless render context.
//!
//! Behaves like one of the supported device backends without a GPU: device
//! objects live in host memory, state changes are validated the way the
//! device would validate them and every command is recorded for inspection.

mod commands;
mod factory;

pub use commands::{DrawCall, RecordedCommand};
pub use factory::HeadlessFactory;

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::BackendType;

/// Vertex buffer slots available on every backend
pub const MAX_VERTEX_BUFFER_SLOTS: u32 = 8;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Binding state validated against the bound resource binding slots
#[derive(Debug, Default)]
struct BoundResources {
    slots: Option<ResourceBindingSlotsHandle>,
    constant_buffers: Vec<Option<BufferHandle>>,
    textures: Vec<Option<TextureBindingHandle>>,
    samplers: Vec<Option<SamplerHandle>>,
}

/// Render context backed by [`HeadlessFactory`]
#[derive(Debug)]
pub struct HeadlessContext {
    id: ContextId,
    factory: HeadlessFactory,
    window_size: (u32, u32),
    clear_color: [f32; 4],
    framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,
    scissor: Option<ScissorRect>,
    vertex_buffers: [Option<BufferHandle>; MAX_VERTEX_BUFFER_SLOTS as usize],
    index_buffer: Option<(BufferHandle, IndexFormat)>,
    shader_set: Option<ShaderSetHandle>,
    bound: BoundResources,
    rasterizer_state: RasterizerStateHandle,
    depth_stencil_state: DepthStencilStateHandle,
    default_depth_stencil_state: DepthStencilStateHandle,
    point_sampler: SamplerHandle,
    anisox4_sampler: SamplerHandle,
    commands: Vec<RecordedCommand>,
    frames_presented: u64,
    debug: bool,
}

impl HeadlessContext {
    /// Create a context emulating `backend` with a window of the given size
    pub fn new(backend: BackendType, width: u32, height: u32) -> BackendResult<Self> {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        let mut factory = HeadlessFactory::new(id, backend);

        let rasterizer_state = factory.create_rasterizer_state(&RasterizerDescriptor::default())?;
        let default_depth_stencil_state =
            factory.create_depth_stencil_state(&DepthStencilDescriptor::default())?;
        let point_sampler = factory.create_sampler_state(&SamplerDescriptor::point())?;
        let anisox4_sampler = factory.create_sampler_state(&SamplerDescriptor::anisotropic(4))?;

        log::info!(
            "Created headless {} context #{} ({}x{})",
            backend,
            id.0,
            width,
            height
        );

        Ok(Self {
            id,
            factory,
            window_size: (width, height),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            framebuffer: None,
            viewport: Viewport::new(0, 0, width, height),
            scissor: None,
            vertex_buffers: [None; MAX_VERTEX_BUFFER_SLOTS as usize],
            index_buffer: None,
            shader_set: None,
            bound: BoundResources::default(),
            rasterizer_state,
            depth_stencil_state: default_depth_stencil_state,
            default_depth_stencil_state,
            point_sampler,
            anisox4_sampler,
            commands: Vec::new(),
            frames_presented: 0,
            debug: false,
        })
    }

    /// Log every recorded command at debug level, like a native debug device
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Factory with read access to device object contents
    pub fn factory(&self) -> &HeadlessFactory {
        &self.factory
    }

    /// Every command recorded since the last [`HeadlessContext::take_commands`]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Recorded draw calls, in submission order
    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(RecordedCommand::as_draw)
    }

    /// Drain the recorded commands
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of `swap_buffers` calls so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Active scissor rectangle, if any
    pub fn scissor(&self) -> Option<ScissorRect> {
        self.scissor
    }

    /// Resize the window; the viewport is reset to cover it
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        self.viewport = Viewport::new(0, 0, width, height);
    }

    fn record(&mut self, command: RecordedCommand) {
        if self.debug {
            log::debug!("context #{}: {:?}", self.id.0, command);
        }
        self.commands.push(command);
    }

    fn texel_for_clear(&self, format: TextureFormat) -> Vec<u8> {
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        let [r, g, b, a] = self.clear_color;
        match format {
            TextureFormat::Rgba8Unorm => vec![to_u8(r), to_u8(g), to_u8(b), to_u8(a)],
            TextureFormat::Bgra8Unorm => vec![to_u8(b), to_u8(g), to_u8(r), to_u8(a)],
            TextureFormat::Rgba32Float => {
                bytemuck::cast_slice::<f32, u8>(&self.clear_color[..]).to_vec()
            }
            TextureFormat::R8Uint => vec![to_u8(r)],
            TextureFormat::R16Uint => ((r.clamp(0.0, 1.0) * 65535.0) as u16)
                .to_le_bytes()
                .to_vec(),
        }
    }

    fn check_slot(kind: SlotKind, slot: u32, count: u32) -> BackendResult<usize> {
        if slot < count {
            Ok(slot as usize)
        } else {
            Err(BackendError::InvalidSlot { kind, slot, count })
        }
    }
}

impl RenderContext for HeadlessContext {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn backend_type(&self) -> BackendType {
        self.factory.backend_type()
    }

    fn resource_factory(&mut self) -> &mut dyn ResourceFactory {
        &mut self.factory
    }

    fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    fn set_framebuffer(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        self.factory.framebuffer_attachments(framebuffer)?;
        self.framebuffer = Some(framebuffer);
        self.record(RecordedCommand::SetFramebuffer(Some(framebuffer)));
        Ok(())
    }

    fn set_default_framebuffer(&mut self) {
        self.framebuffer = None;
        self.record(RecordedCommand::SetFramebuffer(None));
    }

    fn current_framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear_buffer(&mut self) -> BackendResult<()> {
        if let Some(framebuffer) = self.framebuffer {
            let (color, depth) = self.factory.framebuffer_attachments(framebuffer)?;
            if let Some(color) = color {
                let format = self.factory.texture_descriptor(color)?.format;
                let texel = self.texel_for_clear(format);
                self.factory.fill_texture(color, &texel)?;
            }
            if let Some(depth) = depth {
                self.factory.fill_texture(depth, &u16::MAX.to_le_bytes())?;
            }
        }
        self.record(RecordedCommand::Clear {
            framebuffer: self.framebuffer,
            color: self.clear_color,
        });
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.record(RecordedCommand::SetViewport(viewport));
    }

    fn set_scissor_rectangle(&mut self, rect: ScissorRect) {
        self.scissor = Some(rect);
        self.record(RecordedCommand::SetScissor(Some(rect)));
    }

    fn clear_scissor_rectangle(&mut self) {
        self.scissor = None;
        self.record(RecordedCommand::SetScissor(None));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) -> BackendResult<()> {
        let index = Self::check_slot(SlotKind::VertexBuffer, slot, MAX_VERTEX_BUFFER_SLOTS)?;
        let (usage, _) = self.factory.buffer_usage(buffer)?;
        if !usage.contains(BufferUsage::VERTEX) {
            return Err(BackendError::InvalidHandle {
                kind: "vertex buffer",
                raw: buffer.0,
            });
        }
        self.vertex_buffers[index] = Some(buffer);
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer });
        Ok(())
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) -> BackendResult<()> {
        let (usage, _) = self.factory.buffer_usage(buffer)?;
        if !usage.contains(BufferUsage::INDEX) {
            return Err(BackendError::InvalidHandle {
                kind: "index buffer",
                raw: buffer.0,
            });
        }
        self.index_buffer = Some((buffer, format));
        self.record(RecordedCommand::SetIndexBuffer { buffer, format });
        Ok(())
    }

    fn set_shader_set(&mut self, shader_set: ShaderSetHandle) -> BackendResult<()> {
        self.factory.shader_set_inputs(shader_set)?;
        self.shader_set = Some(shader_set);
        self.record(RecordedCommand::SetShaderSet(shader_set));
        Ok(())
    }

    fn set_resource_binding_slots(
        &mut self,
        slots: ResourceBindingSlotsHandle,
    ) -> BackendResult<()> {
        let (_, constants, textures) = self.factory.binding_slot_counts(slots)?;
        self.bound = BoundResources {
            slots: Some(slots),
            constant_buffers: vec![None; constants as usize],
            textures: vec![None; textures as usize],
            samplers: vec![None; textures as usize],
        };
        self.record(RecordedCommand::SetResourceBindingSlots(slots));
        Ok(())
    }

    fn set_constant_buffer(&mut self, slot: u32, buffer: BufferHandle) -> BackendResult<()> {
        let count = self.bound.constant_buffers.len() as u32;
        let index = Self::check_slot(SlotKind::ConstantBuffer, slot, count)?;
        let (usage, _) = self.factory.buffer_usage(buffer)?;
        if !usage.contains(BufferUsage::CONSTANT) {
            return Err(BackendError::InvalidHandle {
                kind: "constant buffer",
                raw: buffer.0,
            });
        }
        self.bound.constant_buffers[index] = Some(buffer);
        self.record(RecordedCommand::SetConstantBuffer { slot, buffer });
        Ok(())
    }

    fn set_texture(&mut self, slot: u32, binding: TextureBindingHandle) -> BackendResult<()> {
        let count = self.bound.textures.len() as u32;
        let index = Self::check_slot(SlotKind::Texture, slot, count)?;
        self.factory.binding_texture(binding)?;
        self.bound.textures[index] = Some(binding);
        self.record(RecordedCommand::SetTexture { slot, binding });
        Ok(())
    }

    fn set_sampler_state(&mut self, slot: u32, sampler: SamplerHandle) -> BackendResult<()> {
        let count = self.bound.samplers.len() as u32;
        let index = Self::check_slot(SlotKind::Sampler, slot, count)?;
        self.factory.check_sampler(sampler)?;
        self.bound.samplers[index] = Some(sampler);
        self.record(RecordedCommand::SetSampler { slot, sampler });
        Ok(())
    }

    fn rasterizer_state(&self) -> RasterizerStateHandle {
        self.rasterizer_state
    }

    fn set_rasterizer_state(&mut self, state: RasterizerStateHandle) -> BackendResult<()> {
        self.factory.rasterizer_descriptor(state)?;
        self.rasterizer_state = state;
        self.record(RecordedCommand::SetRasterizerState(state));
        Ok(())
    }

    fn depth_stencil_state(&self) -> DepthStencilStateHandle {
        self.depth_stencil_state
    }

    fn set_depth_stencil_state(&mut self, state: DepthStencilStateHandle) -> BackendResult<()> {
        self.factory.depth_stencil_descriptor(state)?;
        self.depth_stencil_state = state;
        self.record(RecordedCommand::SetDepthStencilState(state));
        Ok(())
    }

    fn default_depth_stencil_state(&self) -> DepthStencilStateHandle {
        self.default_depth_stencil_state
    }

    fn point_sampler(&self) -> SamplerHandle {
        self.point_sampler
    }

    fn anisox4_sampler(&self) -> SamplerHandle {
        self.anisox4_sampler
    }

    fn draw_indexed_primitives(&mut self, count: u32, start_index: u32) -> BackendResult<()> {
        let shader_set = self
            .shader_set
            .ok_or(BackendError::IncompleteDrawState("no shader set bound"))?;
        let slots = self
            .bound
            .slots
            .ok_or(BackendError::IncompleteDrawState("no resource binding slots bound"))?;
        let (slots_set, _, _) = self.factory.binding_slot_counts(slots)?;
        if slots_set != shader_set {
            return Err(BackendError::IncompleteDrawState(
                "resource binding slots belong to a different shader set",
            ));
        }
        let inputs = self.factory.shader_set_inputs(shader_set)?;
        if self
            .vertex_buffers
            .iter()
            .take(inputs as usize)
            .any(Option::is_none)
        {
            return Err(BackendError::IncompleteDrawState("vertex buffer slot unbound"));
        }
        if self.bound.constant_buffers.iter().any(Option::is_none) {
            return Err(BackendError::IncompleteDrawState("constant buffer slot unbound"));
        }
        if self.bound.textures.iter().any(Option::is_none) {
            return Err(BackendError::IncompleteDrawState("texture slot unbound"));
        }
        let (index_buffer, format) = self
            .index_buffer
            .ok_or(BackendError::IncompleteDrawState("no index buffer bound"))?;
        let (_, size) = self.factory.buffer_usage(index_buffer)?;
        let index_size = match format {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        };
        if (start_index as usize + count as usize) * index_size > size {
            return Err(BackendError::IncompleteDrawState(
                "index range exceeds the bound index buffer",
            ));
        }

        let draw = DrawCall {
            framebuffer: self.framebuffer,
            viewport: self.viewport,
            shader_set,
            rasterizer_state: self.rasterizer_state,
            depth_stencil_state: self.depth_stencil_state,
            constant_buffers: self.bound.constant_buffers.clone(),
            textures: self.bound.textures.clone(),
            samplers: self.bound.samplers.clone(),
            index_count: count,
            start_index,
        };
        self.record(RecordedCommand::DrawIndexed(draw));
        Ok(())
    }

    fn swap_buffers(&mut self) -> BackendResult<()> {
        self.frames_presented += 1;
        self.record(RecordedCommand::SwapBuffers);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
