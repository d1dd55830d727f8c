//! Main scene pass driver
//!
//! Sky backdrop first so opaque geometry overdraws it, then every visible
//! item that intersects the caller's layer mask. Per draw: one texture
//! descriptor bind and one push-constant block; the shadow map and
//! refraction color are bound once per frame through the frame descriptor
//! set with immutable samplers.

use ash::vk;

use crate::scene::{DrawItem, LayerMask};

use super::super::commands::CommandPool;
use super::super::context::{VulkanContext, VulkanResult};
use super::super::mesh::MeshRegistry;
use super::super::pipeline::{GraphicsProgram, ProgramConfig};
use super::super::texture_cache::TextureCache;
use super::{push_flags, set_viewport, ScenePush};

/// Items the main pass draws for a given layer mask
pub fn layer_visible<'a>(
    items: &'a [DrawItem],
    mask: LayerMask,
) -> impl Iterator<Item = &'a DrawItem> {
    items
        .iter()
        .filter(move |item| item.visible && item.layers.intersects(mask))
}

/// Main pass driver; owns the opaque scene program (shared with the
/// refraction pass) and the skybox program.
pub struct MainSceneDriver {
    opaque: GraphicsProgram,
    sky: GraphicsProgram,
}

impl MainSceneDriver {
    /// Build both programs against the scene render pass
    pub fn new(
        device: ash::Device,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        shader_path: impl Fn(&str) -> String + Copy,
    ) -> VulkanResult<Self> {
        let opaque = GraphicsProgram::new(
            device.clone(),
            render_pass,
            &ProgramConfig::scene(shader_path),
            set_layouts,
        )?;
        let sky = GraphicsProgram::new(
            device,
            render_pass,
            &ProgramConfig::sky(shader_path),
            &set_layouts[..1], // frame set only
        )?;
        Ok(Self { opaque, sky })
    }

    /// The opaque program, reused by the refraction pass
    pub fn opaque_program(&self) -> &GraphicsProgram {
        &self.opaque
    }

    /// Record the sky backdrop: fullscreen triangle, no depth access
    pub fn record_sky(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        frame_set: vk::DescriptorSet,
    ) {
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.sky.handle());
        }
        set_viewport(device, cmd, extent);
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.sky.layout(),
                0,
                &[frame_set],
                &[],
            );
            device.cmd_draw(cmd, 3, 1, 0, 0);
        }
    }

    /// Record draws for a filtered item list with the opaque program.
    ///
    /// The refraction pass calls this too, with its own filter and
    /// `reduced = true` so fragments skip shadow and refraction sampling.
    pub fn record_items<'a>(
        &self,
        context: &VulkanContext,
        command_pool: &CommandPool,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        frame_set: vk::DescriptorSet,
        registry: &MeshRegistry,
        textures: &mut TextureCache,
        items: impl Iterator<Item = &'a DrawItem>,
        reduced: bool,
    ) -> VulkanResult<()> {
        let device = context.raw_device();
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.opaque.handle());
        }
        set_viewport(device, cmd, extent);
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.opaque.layout(),
                0,
                &[frame_set],
                &[],
            );
        }

        for item in items {
            let Some(mesh) = registry.get(item.mesh) else {
                log::warn!("Draw item references an unknown mesh; skipping");
                continue;
            };
            let texture_set =
                textures.descriptor_for(context, command_pool, item.texture.as_deref())?;

            let mut flags = 0;
            if item.receives_shadow {
                flags |= push_flags::RECEIVES_SHADOW;
            }
            if reduced {
                flags |= push_flags::REDUCED_SHADING;
            }
            let push = ScenePush {
                model: item.transform.into(),
                shading: item.shading.shader_index(),
                flags,
                layers: item.layers.bits(),
                burn: item.burn_factor,
            };

            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.opaque.layout(),
                    1,
                    &[texture_set],
                    &[],
                );
                device.cmd_push_constants(
                    cmd,
                    self.opaque.layout(),
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.handle()], &[0]);
                device.cmd_bind_index_buffer(cmd, mesh.indices.handle(), 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, mesh.indices.index_count(), 1, 0, 0, 0);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::scene::{MeshHandle, ShadingMode};

    fn item(layers: LayerMask) -> DrawItem {
        DrawItem {
            transform: Mat4::identity(),
            mesh: MeshHandle::default(),
            texture: None,
            visible: true,
            casts_shadow: true,
            receives_shadow: true,
            shading: ShadingMode::Standard,
            layers,
            burn_factor: 0.0,
        }
    }

    #[test]
    fn layer_mask_partitions_identical_items() {
        // Two items identical except for their layer: an INSIDE call draws
        // exactly one of them.
        let items = vec![item(LayerMask::INSIDE), item(LayerMask::OUTSIDE)];
        let drawn: Vec<_> = layer_visible(&items, LayerMask::INSIDE).collect();
        assert_eq!(drawn.len(), 1);
        assert_eq!(drawn[0].layers, LayerMask::INSIDE);
    }

    #[test]
    fn invisible_items_are_skipped_regardless_of_layer() {
        let mut hidden = item(LayerMask::OUTSIDE);
        hidden.visible = false;
        let items = vec![hidden];
        assert_eq!(layer_visible(&items, LayerMask::OUTSIDE).count(), 0);
    }

    #[test]
    fn full_mask_draws_both_partitions() {
        let items = vec![item(LayerMask::INSIDE), item(LayerMask::OUTSIDE)];
        let mask = LayerMask::INSIDE | LayerMask::OUTSIDE;
        assert_eq!(layer_visible(&items, mask).count(), 2);
    }
}
