//! Refraction pass driver
//!
//! A reduced-shading pre-pass of the solid scene into its own color target
//! (sharing the main pass's depth image), later sampled by water surfaces
//! for distortion. Water itself and the skybox-combined, flat and wireframe
//! shading classes stay out: they either read this target or contribute
//! nothing through it.
//!
//! The pass reuses the opaque scene program; the layout transition making
//! its output sampleable is derived in `barrier.rs` and recorded by the
//! orchestrator between this pass and the main pass.

use ash::vk;

use crate::scene::{DrawItem, LayerMask, ShadingMode};

use super::super::commands::CommandPool;
use super::super::context::{VulkanContext, VulkanResult};
use super::super::mesh::MeshRegistry;
use super::super::texture_cache::TextureCache;
use super::main_scene::MainSceneDriver;

/// Whether an item is part of the refraction source image
pub fn refracts(item: &DrawItem, mask: LayerMask) -> bool {
    item.visible
        && item.layers.intersects(mask)
        && !matches!(
            item.shading,
            ShadingMode::Water
                | ShadingMode::SkyboxCombined
                | ShadingMode::Flat
                | ShadingMode::Wireframe
        )
}

/// Items the refraction pass draws
pub fn refraction_items<'a>(
    items: &'a [DrawItem],
    mask: LayerMask,
) -> impl Iterator<Item = &'a DrawItem> {
    items.iter().filter(move |item| refracts(item, mask))
}

/// Refraction pass driver; records through the scene driver's opaque program
pub struct RefractionPassDriver;

impl RefractionPassDriver {
    /// Record the whole pass into the refraction framebuffer
    pub fn record(
        &self,
        context: &VulkanContext,
        command_pool: &CommandPool,
        cmd: vk::CommandBuffer,
        scene: &MainSceneDriver,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        frame_set: vk::DescriptorSet,
        registry: &MeshRegistry,
        textures: &mut TextureCache,
        items: &[DrawItem],
        mask: LayerMask,
        clear_color: [f32; 4],
    ) -> VulkanResult<()> {
        let device = context.raw_device();
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }

        scene.record_items(
            context,
            command_pool,
            cmd,
            extent,
            frame_set,
            registry,
            textures,
            refraction_items(items, mask),
            true, // reduced shading
        )?;

        unsafe {
            device.cmd_end_render_pass(cmd);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Mat4;
    use crate::scene::MeshHandle;

    fn item(shading: ShadingMode) -> DrawItem {
        DrawItem {
            transform: Mat4::identity(),
            mesh: MeshHandle::default(),
            texture: None,
            visible: true,
            casts_shadow: false,
            receives_shadow: false,
            shading,
            layers: LayerMask::OUTSIDE,
            burn_factor: 0.0,
        }
    }

    #[test]
    fn excluded_shading_classes_stay_out() {
        let mask = LayerMask::OUTSIDE;
        for shading in [
            ShadingMode::Water,
            ShadingMode::SkyboxCombined,
            ShadingMode::Flat,
            ShadingMode::Wireframe,
        ] {
            assert!(
                !refracts(&item(shading), mask),
                "{:?} must not render into the refraction target",
                shading
            );
        }
    }

    #[test]
    fn standard_geometry_refracts() {
        assert!(refracts(&item(ShadingMode::Standard), LayerMask::OUTSIDE));
    }

    #[test]
    fn layer_mask_applies_to_the_refraction_pass_too() {
        let standard = item(ShadingMode::Standard);
        assert!(!refracts(&standard, LayerMask::INSIDE));
    }

    #[test]
    fn invisible_items_do_not_refract() {
        let mut hidden = item(ShadingMode::Standard);
        hidden.visible = false;
        assert!(!refracts(&hidden, LayerMask::OUTSIDE));
    }
}
