//! Materials: a shader set plus the layout of the resources it reads

use crate::backend::shader::load_shader_set;
use crate::backend::traits::*;
use crate::backend::types::*;

/// What a material needs to be created
#[derive(Debug, Clone)]
pub struct MaterialDescriptor {
    /// Base name of the shader assets, e.g. "shadowmap"
    pub shader_set_name: &'static str,
    pub vertex_inputs: Vec<VertexInputDescription>,
    /// Constant buffers and textures in slot order
    pub resources: Vec<ShaderResourceDescription>,
}

/// Shader set and binding slots created for one descriptor
#[derive(Debug, Clone)]
pub struct Material {
    pub name: &'static str,
    pub shader_set: ShaderSetHandle,
    pub binding_slots: ResourceBindingSlotsHandle,
    shaders: [ShaderHandle; 2],
}

impl Material {
    pub fn create(
        factory: &mut dyn ResourceFactory,
        desc: &MaterialDescriptor,
    ) -> BackendResult<Self> {
        let (shader_set, shaders) =
            load_shader_set(factory, desc.shader_set_name, desc.vertex_inputs.clone())?;
        let binding_slots = factory.create_resource_binding_slots(shader_set, &desc.resources)?;
        Ok(Self {
            name: desc.shader_set_name,
            shader_set,
            binding_slots,
            shaders,
        })
    }

    /// Bind shader set and binding slots
    pub fn apply(&self, rc: &mut dyn RenderContext) -> BackendResult<()> {
        rc.set_shader_set(self.shader_set)?;
        rc.set_resource_binding_slots(self.binding_slots)
    }

    /// Tie-break used in render order keys so draws group by material
    pub fn id(&self) -> u32 {
        self.shader_set.id()
    }

    pub fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.binding_slots.into());
        factory.destroy(self.shader_set.into());
        for shader in self.shaders {
            factory.destroy(shader.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessContext;
    use crate::BackendType;

    fn descriptor() -> MaterialDescriptor {
        MaterialDescriptor {
            shader_set_name: "test",
            vertex_inputs: vec![VertexPositionNormalTexture::layout()],
            resources: vec![
                ShaderResourceDescription::constant("WorldMatrix", ShaderConstantType::Matrix4x4),
                ShaderResourceDescription::texture("SurfaceTexture"),
            ],
        }
    }

    #[test]
    fn test_apply_enables_slots() {
        let mut ctx = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let material = Material::create(ctx.resource_factory(), &descriptor()).unwrap();
        material.apply(&mut ctx).unwrap();

        let sampler = ctx.point_sampler();
        assert!(ctx.set_sampler_state(0, sampler).is_ok());
        assert_eq!(
            ctx.set_sampler_state(1, sampler),
            Err(BackendError::InvalidSlot {
                kind: SlotKind::Sampler,
                slot: 1,
                count: 1
            })
        );
    }

    #[test]
    fn test_destroy_releases_objects() {
        let mut ctx = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let before = ctx.factory().live_objects();
        let material = Material::create(ctx.resource_factory(), &descriptor()).unwrap();
        assert_eq!(ctx.factory().live_objects(), before + 4);

        material.destroy(ctx.resource_factory());
        assert_eq!(ctx.factory().live_objects(), before);
    }
}
