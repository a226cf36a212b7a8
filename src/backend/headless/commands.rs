//! Commands recorded by the headless render context

use crate::backend::traits::*;
use crate::backend::types::*;

/// Snapshot of the binding state at the time of a draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub framebuffer: Option<FramebufferHandle>,
    pub viewport: Viewport,
    pub shader_set: ShaderSetHandle,
    pub rasterizer_state: RasterizerStateHandle,
    pub depth_stencil_state: DepthStencilStateHandle,
    pub constant_buffers: Vec<Option<BufferHandle>>,
    pub textures: Vec<Option<TextureBindingHandle>>,
    pub samplers: Vec<Option<SamplerHandle>>,
    pub index_count: u32,
    pub start_index: u32,
}

impl DrawCall {
    /// Whether `binding` was bound to any texture slot for this draw
    pub fn samples(&self, binding: TextureBindingHandle) -> bool {
        self.textures.iter().any(|t| *t == Some(binding))
    }
}

/// One state change or action submitted to a headless context
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    SetFramebuffer(Option<FramebufferHandle>),
    Clear {
        framebuffer: Option<FramebufferHandle>,
        color: [f32; 4],
    },
    SetViewport(Viewport),
    SetScissor(Option<ScissorRect>),
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    SetShaderSet(ShaderSetHandle),
    SetResourceBindingSlots(ResourceBindingSlotsHandle),
    SetConstantBuffer { slot: u32, buffer: BufferHandle },
    SetTexture { slot: u32, binding: TextureBindingHandle },
    SetSampler { slot: u32, sampler: SamplerHandle },
    SetRasterizerState(RasterizerStateHandle),
    SetDepthStencilState(DepthStencilStateHandle),
    DrawIndexed(DrawCall),
    SwapBuffers,
}

impl RecordedCommand {
    pub fn as_draw(&self) -> Option<&DrawCall> {
        match self {
            RecordedCommand::DrawIndexed(draw) => Some(draw),
            _ => None,
        }
    }
}
