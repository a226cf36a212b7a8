//! Shader asset naming and loading per backend

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::BackendType;

/// File extension of shader source for a backend
pub fn source_extension(backend: BackendType) -> &'static str {
    match backend {
        BackendType::Direct3D11 => ".hlsl",
        BackendType::Vulkan => ".450.glsl",
        BackendType::OpenGL | BackendType::OpenGLES => ".330.glsl",
    }
}

/// File extension of precompiled shader bytecode for a backend
pub fn bytecode_extension(backend: BackendType) -> BackendResult<&'static str> {
    match backend {
        BackendType::Direct3D11 => Ok(".hlsl.bytes"),
        BackendType::Vulkan => Ok(".450.glsl.spv"),
        BackendType::OpenGL | BackendType::OpenGLES => {
            Err(BackendError::BytecodeUnsupported(backend))
        }
    }
}

/// Asset name of one stage of a shader set, e.g. `shadow-vertex.450.glsl`
pub fn shader_asset_name(set_name: &str, stage: ShaderStage, backend: BackendType) -> String {
    format!("{}-{}{}", set_name, stage.suffix(), source_extension(backend))
}

/// Create one stage of a shader set.
///
/// Precompiled `bytecode` is used when the backend accepts it; otherwise the
/// backend processes the source asset.
pub fn load_shader(
    factory: &mut dyn ResourceFactory,
    set_name: &str,
    stage: ShaderStage,
    bytecode: Option<&[u8]>,
) -> BackendResult<ShaderHandle> {
    let backend = factory.backend_type();
    let code = match bytecode {
        Some(bytes) if bytecode_extension(backend).is_ok() => {
            factory.load_processed_shader(bytes)?
        }
        _ => {
            let name = shader_asset_name(set_name, stage, backend);
            factory.process_shader_code(stage, &name)?
        }
    };
    factory.create_shader(stage, &code)
}

/// Create the vertex and fragment shaders of a set and link them
pub fn load_shader_set(
    factory: &mut dyn ResourceFactory,
    set_name: &str,
    vertex_inputs: Vec<VertexInputDescription>,
) -> BackendResult<(ShaderSetHandle, [ShaderHandle; 2])> {
    let vertex_shader = load_shader(factory, set_name, ShaderStage::Vertex, None)?;
    let fragment_shader = load_shader(factory, set_name, ShaderStage::Fragment, None)?;
    let set = factory.create_shader_set(&ShaderSetDescriptor {
        vertex_inputs,
        vertex_shader,
        fragment_shader,
    })?;
    Ok((set, [vertex_shader, fragment_shader]))
}
