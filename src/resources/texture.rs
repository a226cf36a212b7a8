//! Texture data and device textures

use crate::backend::traits::*;
use crate::backend::types::*;

/// Texel data kept on the host
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self::filled(1, 1, color, name)
    }

    /// Create a texture of one color at the given size
    pub fn filled(width: u32, height: u32, color: [u8; 4], name: &str) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba8Unorm,
            data: color.repeat((width * height) as usize),
            name: name.to_string(),
        }
    }

    /// Create a default white texture
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8-texel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// Six faces of a cubemap
#[derive(Debug, Clone)]
pub struct CubemapData {
    pub front: TextureData,
    pub back: TextureData,
    pub left: TextureData,
    pub right: TextureData,
    pub top: TextureData,
    pub bottom: TextureData,
}

impl CubemapData {
    /// Cubemap with every face set to `color`; useful as a sky placeholder
    pub fn solid(size: u32, color: [u8; 4]) -> Self {
        let face = |name: &str| TextureData::filled(size, size, color, name);
        Self {
            front: face("front"),
            back: face("back"),
            left: face("left"),
            right: face("right"),
            top: face("top"),
            bottom: face("bottom"),
        }
    }

    /// Upload all faces; the front face decides the size
    pub fn create(&self, factory: &mut dyn ResourceFactory) -> BackendResult<TextureHandle> {
        let faces = CubemapFaces {
            front: &self.front.data,
            back: &self.back.data,
            left: &self.left.data,
            right: &self.right.data,
            top: &self.top.data,
            bottom: &self.bottom.data,
        };
        factory.create_cubemap_texture(&faces, self.front.width, self.front.height)
    }
}

/// Device texture and the binding shaders sample it through
#[derive(Debug, Clone, Copy)]
pub struct GpuTexture {
    pub texture: TextureHandle,
    pub binding: TextureBindingHandle,
}

impl GpuTexture {
    /// Create and upload texture data
    pub fn create(factory: &mut dyn ResourceFactory, data: &TextureData) -> BackendResult<Self> {
        let texture = factory.create_texture(&TextureDescriptor {
            label: Some(data.name.clone()),
            width: data.width,
            height: data.height,
            mip_levels: 1,
            format: data.format,
            options: TextureCreateOptions::None,
        })?;
        factory.write_texture(texture, &data.data)?;
        let binding = factory.create_texture_binding(texture)?;
        Ok(Self { texture, binding })
    }

    /// Wrap an existing texture, typically a cubemap
    pub fn bind(factory: &mut dyn ResourceFactory, texture: TextureHandle) -> BackendResult<Self> {
        let binding = factory.create_texture_binding(texture)?;
        Ok(Self { texture, binding })
    }

    pub fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy(self.binding.into());
        factory.destroy(self.texture.into());
    }
}
