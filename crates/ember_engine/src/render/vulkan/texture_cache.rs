//! String-keyed texture and descriptor cache
//!
//! One descriptor set per texture, allocated from a fixed-capacity pool and
//! cached for the renderer's lifetime. File paths and procedural names share
//! one key namespace. A missing or undecodable file never fails a frame: the
//! default texture is substituted and a warning logged. The cache grows for
//! the process lifetime; there is no eviction.

use ash::vk;
use std::collections::HashMap;

use super::commands::CommandPool;
use super::context::{VulkanContext, VulkanResult};
use super::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::texture::Texture;

/// Procedural texture recipes.
///
/// A closed set of tagged variants rather than arbitrary generator
/// callbacks, so registrations stay serializable and testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProceduralSpec {
    /// Single color
    Solid {
        /// Fill color
        rgba: [u8; 4],
    },
    /// Checkerboard of `cells` x `cells` squares
    Checkerboard {
        /// Texture edge length in pixels
        size: u32,
        /// Number of cells along each edge
        cells: u32,
        /// Color of even cells
        light: [u8; 4],
        /// Color of odd cells
        dark: [u8; 4],
    },
    /// Vertical gradient from `top` to `bottom`
    Gradient {
        /// Texture edge length in pixels
        size: u32,
        /// Color of the first row
        top: [u8; 4],
        /// Color of the last row
        bottom: [u8; 4],
    },
}

impl ProceduralSpec {
    /// Generate pixels: `(width, height, rgba_bytes)`
    pub fn generate(&self) -> (u32, u32, Vec<u8>) {
        match *self {
            Self::Solid { rgba } => (1, 1, rgba.to_vec()),
            Self::Checkerboard {
                size,
                cells,
                light,
                dark,
            } => {
                let cell_px = (size / cells.max(1)).max(1);
                let mut pixels = Vec::with_capacity((size * size * 4) as usize);
                for y in 0..size {
                    for x in 0..size {
                        let parity = (x / cell_px + y / cell_px) % 2;
                        let color = if parity == 0 { light } else { dark };
                        pixels.extend_from_slice(&color);
                    }
                }
                (size, size, pixels)
            }
            Self::Gradient { size, top, bottom } => {
                let mut pixels = Vec::with_capacity((size * size * 4) as usize);
                for y in 0..size {
                    let t = if size > 1 {
                        y as f32 / (size - 1) as f32
                    } else {
                        0.0
                    };
                    let row: Vec<u8> = (0..4)
                        .map(|c| {
                            let a = f32::from(top[c]);
                            let b = f32::from(bottom[c]);
                            (a + (b - a) * t).round() as u8
                        })
                        .collect();
                    for _ in 0..size {
                        pixels.extend_from_slice(&row);
                    }
                }
                (size, size, pixels)
            }
        }
    }
}

struct CacheEntry {
    // Held so the image outlives its descriptor set
    _texture: Texture,
    descriptor: vk::DescriptorSet,
}

/// Descriptor-set-per-texture cache with a default fallback
pub struct TextureCache {
    layout: DescriptorSetLayout,
    pool: DescriptorPool,
    entries: HashMap<String, CacheEntry>,
    default_descriptor: vk::DescriptorSet,
    _default_texture: Texture,
}

impl TextureCache {
    /// Create the cache with its layout, pool and built-in default texture
    pub fn new(
        context: &VulkanContext,
        command_pool: &CommandPool,
        capacity: u32,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let layout = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: capacity,
        }];
        let mut pool = DescriptorPool::new(device, capacity, &pool_sizes)?;

        // Built-in default so a fresh renderer draws without any assets
        let (w, h, pixels) = ProceduralSpec::Solid {
            rgba: [255, 255, 255, 255],
        }
        .generate();
        let default_texture = Texture::from_rgba8(context, command_pool, w, h, &pixels)?;
        let default_descriptor =
            Self::write_set(device, &mut pool, &layout, &default_texture)?;

        Ok(Self {
            layout,
            pool,
            entries: HashMap::new(),
            default_descriptor,
            _default_texture: default_texture,
        })
    }

    /// The per-texture set layout, for building program pipeline layouts
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    /// Register a procedural texture under `name`, replacing any previous
    /// registration of the same key.
    pub fn register_procedural(
        &mut self,
        context: &VulkanContext,
        command_pool: &CommandPool,
        name: &str,
        spec: &ProceduralSpec,
    ) -> VulkanResult<()> {
        let (w, h, pixels) = spec.generate();
        let texture = Texture::from_rgba8(context, command_pool, w, h, &pixels)?;
        let descriptor =
            Self::write_set(context.raw_device(), &mut self.pool, &self.layout, &texture)?;
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                _texture: texture,
                descriptor,
            },
        );
        Ok(())
    }

    /// Descriptor set for a texture key, loading from disk on first use.
    ///
    /// `None` and unknown-but-unloadable keys resolve to the default
    /// descriptor; only pool exhaustion or device failure propagate.
    pub fn descriptor_for(
        &mut self,
        context: &VulkanContext,
        command_pool: &CommandPool,
        key: Option<&str>,
    ) -> VulkanResult<vk::DescriptorSet> {
        let Some(key) = key else {
            return Ok(self.default_descriptor);
        };

        if let Some(entry) = self.entries.get(key) {
            return Ok(entry.descriptor);
        }

        // Cache miss: treat the key as a file path
        let loaded = match image::open(key) {
            Ok(decoded) => {
                let rgba = decoded.to_rgba8();
                let (w, h) = rgba.dimensions();
                Some(Texture::from_rgba8(context, command_pool, w, h, &rgba)?)
            }
            Err(e) => {
                log::warn!("Texture '{}' unavailable ({}); using default", key, e);
                None
            }
        };

        let descriptor = match loaded {
            Some(texture) => {
                let descriptor = Self::write_set(
                    context.raw_device(),
                    &mut self.pool,
                    &self.layout,
                    &texture,
                )?;
                self.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        _texture: texture,
                        descriptor,
                    },
                );
                descriptor
            }
            None => self.default_descriptor,
        };

        Ok(descriptor)
    }

    fn write_set(
        device: &ash::Device,
        pool: &mut DescriptorPool,
        layout: &DescriptorSetLayout,
        texture: &Texture,
    ) -> VulkanResult<vk::DescriptorSet> {
        let set = pool.allocate_set(layout.handle())?;
        let image_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(texture.view())
            .sampler(texture.sampler())
            .build();
        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos);
        unsafe {
            device.update_descriptor_sets(&[write.build()], &[]);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_generates_one_pixel() {
        let (w, h, pixels) = ProceduralSpec::Solid {
            rgba: [10, 20, 30, 255],
        }
        .generate();
        assert_eq!((w, h), (1, 1));
        assert_eq!(pixels, vec![10, 20, 30, 255]);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let (w, h, pixels) = ProceduralSpec::Checkerboard {
            size: 4,
            cells: 2,
            light: [255, 255, 255, 255],
            dark: [0, 0, 0, 255],
        }
        .generate();
        assert_eq!((w, h), (4, 4));
        assert_eq!(pixels.len(), 4 * 4 * 4);

        let pixel = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        // Top-left cell light, its right neighbor cell dark
        assert_eq!(pixel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(pixel(2, 0), &[0, 0, 0, 255]);
        // Diagonal cell light again
        assert_eq!(pixel(2, 2), &[255, 255, 255, 255]);
    }

    #[test]
    fn gradient_interpolates_rows() {
        let (w, h, pixels) = ProceduralSpec::Gradient {
            size: 3,
            top: [0, 0, 0, 255],
            bottom: [200, 100, 50, 255],
        }
        .generate();
        assert_eq!((w, h), (3, 3));

        let row = |y: usize| &pixels[y * 3 * 4..y * 3 * 4 + 4];
        assert_eq!(row(0), &[0, 0, 0, 255]);
        assert_eq!(row(1), &[100, 50, 25, 255]);
        assert_eq!(row(2), &[200, 100, 50, 255]);
    }

    #[test]
    fn generated_buffers_match_declared_dimensions() {
        for spec in [
            ProceduralSpec::Solid { rgba: [1, 2, 3, 4] },
            ProceduralSpec::Checkerboard {
                size: 8,
                cells: 4,
                light: [255; 4],
                dark: [0, 0, 0, 255],
            },
            ProceduralSpec::Gradient {
                size: 5,
                top: [0; 4],
                bottom: [255; 4],
            },
        ] {
            let (w, h, pixels) = spec.generate();
            assert_eq!(pixels.len() as u32, w * h * 4);
        }
    }
}
