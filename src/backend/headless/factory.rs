//! In-memory resource factory backing the headless context

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::BackendType;

/// Device object storage
#[derive(Debug)]
pub(crate) enum Resource {
    Buffer {
        usage: BufferUsage,
        data: Vec<u8>,
    },
    Texture {
        desc: TextureDescriptor,
        data: Vec<u8>,
        layers: u32,
    },
    TextureBinding {
        texture: TextureHandle,
    },
    Framebuffer {
        color: Option<TextureHandle>,
        depth: Option<TextureHandle>,
    },
    Sampler(SamplerDescriptor),
    RasterizerState(RasterizerDescriptor),
    DepthStencilState(DepthStencilDescriptor),
    Shader {
        stage: ShaderStage,
    },
    ShaderSet {
        vertex_inputs: u32,
    },
    ResourceBindingSlots {
        shader_set: ShaderSetHandle,
        constants: u32,
        textures: u32,
    },
}

impl Resource {
    fn kind(&self) -> &'static str {
        match self {
            Resource::Buffer { .. } => "buffer",
            Resource::Texture { .. } => "texture",
            Resource::TextureBinding { .. } => "texture binding",
            Resource::Framebuffer { .. } => "framebuffer",
            Resource::Sampler(_) => "sampler",
            Resource::RasterizerState(_) => "rasterizer state",
            Resource::DepthStencilState(_) => "depth-stencil state",
            Resource::Shader { .. } => "shader",
            Resource::ShaderSet { .. } => "shader set",
            Resource::ResourceBindingSlots { .. } => "resource binding slots",
        }
    }
}

/// Resource factory that keeps every device object in host memory.
///
/// Handles carry the owning context id in their high 32 bits, so a handle
/// from a disposed context is reported as stale instead of aliasing a new
/// object.
#[derive(Debug)]
pub struct HeadlessFactory {
    context: ContextId,
    backend: BackendType,
    objects: Vec<Option<Resource>>,
}

impl HeadlessFactory {
    pub(crate) fn new(context: ContextId, backend: BackendType) -> Self {
        Self {
            context,
            backend,
            objects: Vec::new(),
        }
    }

    /// Number of device objects not yet destroyed
    pub fn live_objects(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    /// Contents of a buffer
    pub fn buffer_data(&self, buffer: BufferHandle) -> BackendResult<&[u8]> {
        match self.get(buffer.0, "buffer")? {
            Resource::Buffer { data, .. } => Ok(data),
            other => Err(self.mismatch(buffer.0, other)),
        }
    }

    /// Descriptor a texture was created with
    pub fn texture_descriptor(&self, texture: TextureHandle) -> BackendResult<&TextureDescriptor> {
        match self.get(texture.0, "texture")? {
            Resource::Texture { desc, .. } => Ok(desc),
            other => Err(self.mismatch(texture.0, other)),
        }
    }

    /// Texture a binding refers to
    pub fn binding_texture(&self, binding: TextureBindingHandle) -> BackendResult<TextureHandle> {
        match self.get(binding.0, "texture binding")? {
            Resource::TextureBinding { texture } => Ok(*texture),
            other => Err(self.mismatch(binding.0, other)),
        }
    }

    /// Descriptor of a rasterizer state
    pub fn rasterizer_descriptor(
        &self,
        state: RasterizerStateHandle,
    ) -> BackendResult<RasterizerDescriptor> {
        match self.get(state.0, "rasterizer state")? {
            Resource::RasterizerState(desc) => Ok(*desc),
            other => Err(self.mismatch(state.0, other)),
        }
    }

    /// Descriptor of a depth-stencil state
    pub fn depth_stencil_descriptor(
        &self,
        state: DepthStencilStateHandle,
    ) -> BackendResult<DepthStencilDescriptor> {
        match self.get(state.0, "depth-stencil state")? {
            Resource::DepthStencilState(desc) => Ok(*desc),
            other => Err(self.mismatch(state.0, other)),
        }
    }

    pub(crate) fn buffer_usage(&self, buffer: BufferHandle) -> BackendResult<(BufferUsage, usize)> {
        match self.get(buffer.0, "buffer")? {
            Resource::Buffer { usage, data } => Ok((*usage, data.len())),
            other => Err(self.mismatch(buffer.0, other)),
        }
    }

    pub(crate) fn framebuffer_attachments(
        &self,
        framebuffer: FramebufferHandle,
    ) -> BackendResult<(Option<TextureHandle>, Option<TextureHandle>)> {
        match self.get(framebuffer.0, "framebuffer")? {
            Resource::Framebuffer { color, depth } => Ok((*color, *depth)),
            other => Err(self.mismatch(framebuffer.0, other)),
        }
    }

    pub(crate) fn shader_set_inputs(&self, set: ShaderSetHandle) -> BackendResult<u32> {
        match self.get(set.0, "shader set")? {
            Resource::ShaderSet { vertex_inputs } => Ok(*vertex_inputs),
            other => Err(self.mismatch(set.0, other)),
        }
    }

    /// Returns the shader set, constant count and texture count of a layout
    pub(crate) fn binding_slot_counts(
        &self,
        slots: ResourceBindingSlotsHandle,
    ) -> BackendResult<(ShaderSetHandle, u32, u32)> {
        match self.get(slots.0, "resource binding slots")? {
            Resource::ResourceBindingSlots {
                shader_set,
                constants,
                textures,
            } => Ok((*shader_set, *constants, *textures)),
            other => Err(self.mismatch(slots.0, other)),
        }
    }

    pub(crate) fn check_sampler(&self, sampler: SamplerHandle) -> BackendResult<()> {
        match self.get(sampler.0, "sampler")? {
            Resource::Sampler(_) => Ok(()),
            other => Err(self.mismatch(sampler.0, other)),
        }
    }

    /// Fill every texel of the top mip level with `texel`
    pub(crate) fn fill_texture(&mut self, texture: TextureHandle, texel: &[u8]) -> BackendResult<()> {
        let index = self.index(texture.0, "texture")?;
        match self.objects[index].as_mut() {
            Some(Resource::Texture { data, desc, .. })
                if texel.len() == desc.format.bytes_per_pixel() as usize =>
            {
                for chunk in data.chunks_exact_mut(texel.len()) {
                    chunk.copy_from_slice(texel);
                }
                Ok(())
            }
            Some(Resource::Texture { .. }) => Ok(()),
            _ => Err(BackendError::InvalidHandle {
                kind: "texture",
                raw: texture.0,
            }),
        }
    }

    fn insert(&mut self, resource: Resource) -> u64 {
        let index = self.objects.len() as u64;
        log::trace!(
            "HeadlessFactory[{}]: created {} #{}",
            self.backend,
            resource.kind(),
            index
        );
        self.objects.push(Some(resource));
        ((self.context.0 as u64) << 32) | index
    }

    fn index(&self, raw: u64, kind: &'static str) -> BackendResult<usize> {
        let owner = (raw >> 32) as u32;
        if owner != self.context.0 {
            return Err(BackendError::StaleHandle {
                raw,
                owner,
                active: self.context.0,
            });
        }
        let index = (raw & 0xFFFF_FFFF) as usize;
        match self.objects.get(index) {
            Some(Some(_)) => Ok(index),
            _ => Err(BackendError::InvalidHandle { kind, raw }),
        }
    }

    fn get(&self, raw: u64, kind: &'static str) -> BackendResult<&Resource> {
        let index = self.index(raw, kind)?;
        self.objects[index]
            .as_ref()
            .ok_or(BackendError::InvalidHandle { kind, raw })
    }

    fn mismatch(&self, raw: u64, found: &Resource) -> BackendError {
        BackendError::InvalidHandle {
            kind: found.kind(),
            raw,
        }
    }

    fn check_texture(
        &self,
        texture: TextureHandle,
        options: TextureCreateOptions,
    ) -> BackendResult<()> {
        match self.get(texture.0, "texture")? {
            Resource::Texture { desc, .. } if desc.options == options => Ok(()),
            Resource::Texture { desc, .. } => Err(BackendError::ResourceCreationFailed(format!(
                "texture {:?} was created with {:?}, framebuffer attachment needs {:?}",
                desc.label, desc.options, options
            ))),
            other => Err(self.mismatch(texture.0, other)),
        }
    }

    fn check_shader(&self, shader: ShaderHandle, expected: ShaderStage) -> BackendResult<()> {
        match self.get(shader.0, "shader")? {
            Resource::Shader { stage } if *stage == expected => Ok(()),
            Resource::Shader { stage } => Err(BackendError::ResourceCreationFailed(format!(
                "expected a {:?} shader, got {:?}",
                expected, stage
            ))),
            other => Err(self.mismatch(shader.0, other)),
        }
    }
}

impl ResourceFactory for HeadlessFactory {
    fn backend_type(&self) -> BackendType {
        self.backend
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if desc.size == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "buffer {:?} has zero size",
                desc.label
            )));
        }
        Ok(BufferHandle(self.insert(Resource::Buffer {
            usage: desc.usage,
            data: vec![0; desc.size as usize],
        })))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.create_buffer(desc)?;
        self.write_buffer(buffer, 0, data)?;
        Ok(buffer)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> BackendResult<()> {
        let index = self.index(buffer.0, "buffer")?;
        match self.objects[index].as_mut() {
            Some(Resource::Buffer { data, .. }) => {
                let size = data.len() as u64;
                let overflow = BackendError::BufferOverflow {
                    size,
                    offset,
                    len: bytes.len(),
                };
                let end = match offset.checked_add(bytes.len() as u64) {
                    Some(end) if end <= size => end,
                    _ => return Err(overflow),
                };
                data[offset as usize..end as usize].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(BackendError::InvalidHandle {
                kind: "buffer",
                raw: buffer.0,
            }),
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.options == TextureCreateOptions::DepthStencil
            && desc.format != TextureFormat::R16Uint
        {
            return Err(BackendError::UnsupportedDepthFormat(desc.format));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "texture {:?} has zero extent",
                desc.label
            )));
        }
        log::debug!(
            "HeadlessFactory[{}]: texture {:?} {}x{} as {}",
            self.backend,
            desc.label,
            desc.width,
            desc.height,
            desc.format.native_name(self.backend, desc.options)
        );
        Ok(TextureHandle(self.insert(Resource::Texture {
            desc: desc.clone(),
            data: vec![0; desc.byte_size()],
            layers: 1,
        })))
    }

    fn write_texture(&mut self, texture: TextureHandle, bytes: &[u8]) -> BackendResult<()> {
        let index = self.index(texture.0, "texture")?;
        match self.objects[index].as_mut() {
            Some(Resource::Texture { data, .. }) => {
                if data.len() != bytes.len() {
                    return Err(BackendError::TextureDataSize {
                        expected: data.len(),
                        actual: bytes.len(),
                    });
                }
                data.copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(BackendError::InvalidHandle {
                kind: "texture",
                raw: texture.0,
            }),
        }
    }

    fn create_cubemap_texture(
        &mut self,
        faces: &CubemapFaces<'_>,
        width: u32,
        height: u32,
    ) -> BackendResult<TextureHandle> {
        if width != height || width == 0 {
            return Err(BackendError::ResourceCreationFailed(format!(
                "cubemap faces must be square and non-empty, got {width}x{height}"
            )));
        }
        let face_size = (width * height * TextureFormat::Rgba8Unorm.bytes_per_pixel()) as usize;
        let mut data = Vec::with_capacity(face_size * 6);
        for face in faces.iter() {
            if face.len() != face_size {
                return Err(BackendError::TextureDataSize {
                    expected: face_size,
                    actual: face.len(),
                });
            }
            data.extend_from_slice(face);
        }
        let desc = TextureDescriptor {
            label: Some("cubemap".into()),
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            ..Default::default()
        };
        Ok(TextureHandle(self.insert(Resource::Texture {
            desc,
            data,
            layers: 6,
        })))
    }

    fn create_texture_binding(
        &mut self,
        texture: TextureHandle,
    ) -> BackendResult<TextureBindingHandle> {
        self.texture_descriptor(texture)?;
        Ok(TextureBindingHandle(
            self.insert(Resource::TextureBinding { texture }),
        ))
    }

    fn create_framebuffer(
        &mut self,
        desc: &FramebufferDescriptor,
    ) -> BackendResult<FramebufferHandle> {
        if desc.color.is_none() && desc.depth.is_none() {
            return Err(BackendError::ResourceCreationFailed(
                "framebuffer needs at least one attachment".into(),
            ));
        }
        if let Some(color) = desc.color {
            self.check_texture(color, TextureCreateOptions::RenderTarget)?;
        }
        if let Some(depth) = desc.depth {
            self.check_texture(depth, TextureCreateOptions::DepthStencil)?;
        }
        Ok(FramebufferHandle(self.insert(Resource::Framebuffer {
            color: desc.color,
            depth: desc.depth,
        })))
    }

    fn create_sampler_state(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        if desc.filter == SamplerFilter::Anisotropic && !(1..=16).contains(&desc.max_anisotropy) {
            return Err(BackendError::ResourceCreationFailed(format!(
                "max anisotropy {} out of range 1-16",
                desc.max_anisotropy
            )));
        }
        Ok(SamplerHandle(self.insert(Resource::Sampler(desc.clone()))))
    }

    fn create_rasterizer_state(
        &mut self,
        desc: &RasterizerDescriptor,
    ) -> BackendResult<RasterizerStateHandle> {
        Ok(RasterizerStateHandle(
            self.insert(Resource::RasterizerState(*desc)),
        ))
    }

    fn create_depth_stencil_state(
        &mut self,
        desc: &DepthStencilDescriptor,
    ) -> BackendResult<DepthStencilStateHandle> {
        Ok(DepthStencilStateHandle(
            self.insert(Resource::DepthStencilState(*desc)),
        ))
    }

    fn process_shader_code(
        &mut self,
        stage: ShaderStage,
        asset_name: &str,
    ) -> BackendResult<CompiledShaderCode> {
        if asset_name.is_empty() {
            return Err(BackendError::ResourceCreationFailed(
                "empty shader asset name".into(),
            ));
        }
        log::trace!(
            "HeadlessFactory[{}]: processing {:?} shader {}",
            self.backend,
            stage,
            asset_name
        );
        Ok(CompiledShaderCode::Source {
            stage,
            name: asset_name.to_string(),
        })
    }

    fn load_processed_shader(&mut self, bytes: &[u8]) -> BackendResult<CompiledShaderCode> {
        match self.backend {
            BackendType::OpenGL | BackendType::OpenGLES => {
                Err(BackendError::BytecodeUnsupported(self.backend))
            }
            BackendType::Direct3D11 | BackendType::Vulkan if bytes.is_empty() => Err(
                BackendError::ResourceCreationFailed("empty shader bytecode".into()),
            ),
            BackendType::Direct3D11 | BackendType::Vulkan => {
                Ok(CompiledShaderCode::Bytecode { len: bytes.len() })
            }
        }
    }

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        code: &CompiledShaderCode,
    ) -> BackendResult<ShaderHandle> {
        if let CompiledShaderCode::Source {
            stage: code_stage,
            name,
        } = code
        {
            if *code_stage != stage {
                return Err(BackendError::ResourceCreationFailed(format!(
                    "shader {name} was processed as {code_stage:?}, not {stage:?}"
                )));
            }
        }
        Ok(ShaderHandle(self.insert(Resource::Shader { stage })))
    }

    fn create_shader_set(&mut self, desc: &ShaderSetDescriptor) -> BackendResult<ShaderSetHandle> {
        self.check_shader(desc.vertex_shader, ShaderStage::Vertex)?;
        self.check_shader(desc.fragment_shader, ShaderStage::Fragment)?;
        if desc.vertex_inputs.is_empty() {
            return Err(BackendError::ResourceCreationFailed(
                "shader set needs at least one vertex input".into(),
            ));
        }
        for input in &desc.vertex_inputs {
            if input.packed_size() > input.stride {
                return Err(BackendError::ResourceCreationFailed(format!(
                    "vertex elements need {} bytes but the stride is {}",
                    input.packed_size(),
                    input.stride
                )));
            }
        }
        Ok(ShaderSetHandle(self.insert(Resource::ShaderSet {
            vertex_inputs: desc.vertex_inputs.len() as u32,
        })))
    }

    fn create_resource_binding_slots(
        &mut self,
        shader_set: ShaderSetHandle,
        resources: &[ShaderResourceDescription],
    ) -> BackendResult<ResourceBindingSlotsHandle> {
        self.shader_set_inputs(shader_set)?;
        let textures = resources
            .iter()
            .filter(|r| r.ty == ShaderResourceType::Texture)
            .count() as u32;
        let constants = resources.len() as u32 - textures;
        Ok(ResourceBindingSlotsHandle(self.insert(
            Resource::ResourceBindingSlots {
                shader_set,
                constants,
                textures,
            },
        )))
    }

    fn read_texture_data(&mut self, texture: TextureHandle) -> BackendResult<TextureReadback> {
        match self.get(texture.0, "texture")? {
            Resource::Texture { desc, data, layers } => {
                let top = data.len() / *layers as usize;
                Ok(TextureReadback {
                    width: desc.width,
                    height: desc.height,
                    format: desc.format,
                    data: data[..top].to_vec(),
                })
            }
            other => Err(self.mismatch(texture.0, other)),
        }
    }

    fn destroy(&mut self, object: DeviceObject) {
        let raw = match object {
            DeviceObject::Buffer(h) => h.0,
            DeviceObject::Texture(h) => h.0,
            DeviceObject::TextureBinding(h) => h.0,
            DeviceObject::Framebuffer(h) => h.0,
            DeviceObject::Sampler(h) => h.0,
            DeviceObject::RasterizerState(h) => h.0,
            DeviceObject::DepthStencilState(h) => h.0,
            DeviceObject::Shader(h) => h.0,
            DeviceObject::ShaderSet(h) => h.0,
            DeviceObject::ResourceBindingSlots(h) => h.0,
        };
        match self.index(raw, "device object") {
            Ok(index) => {
                self.objects[index] = None;
            }
            Err(e) => log::warn!("HeadlessFactory[{}]: ignoring destroy: {}", self.backend, e),
        }
    }
}

impl Drop for HeadlessFactory {
    fn drop(&mut self) {
        let live = self.live_objects();
        if live > 0 {
            log::debug!(
                "HeadlessFactory[{}]: releasing {} device objects of context #{}",
                self.backend,
                live,
                self.context.0
            );
        }
    }
}
