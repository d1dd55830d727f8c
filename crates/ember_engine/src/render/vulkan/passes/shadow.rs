//! Shadow pass driver
//!
//! Rasterizes depth-only geometry from the sun's point of view into the
//! high-resolution shadow target. The light's view-projection is recomputed
//! every frame from a fixed-bounds orthographic volume centered on the world
//! origin at the sun's current height. Slope-scaled depth bias is set while
//! recording, keeping acne down without a second geometry pass.

use ash::vk;

use crate::core::config::ShadowConfig;
use crate::foundation::math::{look_at, orthographic_vk, Mat4, Vec3};
use crate::scene::DrawItem;

use super::super::context::VulkanResult;
use super::super::mesh::MeshRegistry;
use super::super::pipeline::{GraphicsProgram, ProgramConfig};
use super::{set_viewport, ShadowPush};

/// Items the shadow pass rasterizes: visible shadow casters only.
///
/// `casts_shadow == false` excludes an item from this pass no matter what
/// its other flags say.
pub fn shadow_casters<'a>(items: &'a [DrawItem]) -> impl Iterator<Item = &'a DrawItem> {
    items.iter().filter(|item| item.visible && item.casts_shadow)
}

/// Compute the sun's view-projection for this frame.
///
/// The volume is a fixed-bounds box around the world origin; the eye sits at
/// the sun's height against its travel direction, so the matrix tracks the
/// sun without ever re-fitting to scene content.
pub fn light_matrix(direction: Vec3, height: f32, config: &ShadowConfig) -> Mat4 {
    let dir = direction.normalize();
    let eye = -dir * height;
    // Avoid a degenerate basis when the sun is directly overhead
    let up = if dir.x.abs() < 1e-4 && dir.z.abs() < 1e-4 {
        Vec3::z()
    } else {
        Vec3::y()
    };
    let view = look_at(eye, Vec3::zeros(), up);
    let half = config.volume_extent;
    let proj = orthographic_vk(-half, half, -half, half, 0.1, config.depth_range);
    proj * view
}

/// Depth-only pass driver
pub struct ShadowPassDriver {
    program: GraphicsProgram,
    config: ShadowConfig,
}

impl ShadowPassDriver {
    /// Build the depth-only program against the shadow render pass
    pub fn new(
        device: ash::Device,
        render_pass: vk::RenderPass,
        config: ShadowConfig,
        shader_path: impl Fn(&str) -> String,
    ) -> VulkanResult<Self> {
        let program = GraphicsProgram::new(
            device,
            render_pass,
            &ProgramConfig::shadow_depth(shader_path),
            &[],
        )?;
        Ok(Self { program, config })
    }

    /// Record the whole pass: render pass, bias, one draw per caster.
    pub fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        registry: &MeshRegistry,
        items: &[DrawItem],
        light_vp: &Mat4,
    ) {
        let clear_values = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }];
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
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.program.handle(),
            );
        }
        set_viewport(device, cmd, extent);
        unsafe {
            device.cmd_set_depth_bias(cmd, self.config.bias_constant, 0.0, self.config.bias_slope);
        }

        for item in shadow_casters(items) {
            let Some(mesh) = registry.get(item.mesh) else {
                continue;
            };
            let push = ShadowPush {
                light_mvp: (light_vp * item.transform).into(),
            };
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    self.program.layout(),
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );
                device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertices.handle()], &[0]);
                device.cmd_bind_index_buffer(cmd, mesh.indices.handle(), 0, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, mesh.indices.index_count(), 1, 0, 0, 0);
            }
        }

        unsafe {
            device.cmd_end_render_pass(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LayerMask, MeshHandle, ShadingMode};
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn item(visible: bool, casts_shadow: bool) -> DrawItem {
        DrawItem {
            transform: Mat4::identity(),
            mesh: MeshHandle::default(),
            texture: None,
            visible,
            casts_shadow,
            receives_shadow: true,
            shading: ShadingMode::Standard,
            layers: LayerMask::OUTSIDE,
            burn_factor: 0.0,
        }
    }

    #[test]
    fn non_casters_never_enter_the_shadow_pass() {
        // A visible item with casts_shadow=false stays out of the shadow
        // draw list even though the main pass would render it.
        let items = vec![item(true, false), item(true, true), item(false, true)];
        let casters: Vec<_> = shadow_casters(&items).collect();
        assert_eq!(casters.len(), 1);
        assert!(casters[0].casts_shadow && casters[0].visible);
    }

    #[test]
    fn empty_scene_yields_empty_shadow_list() {
        let casters: Vec<_> = shadow_casters(&[]).collect();
        assert!(casters.is_empty());
    }

    #[test]
    fn light_volume_keeps_the_origin_centered() {
        let config = ShadowConfig::default();
        let vp = light_matrix(Vec3::new(-0.4, -1.0, -0.3), 100.0, &config);
        let origin = vp * Vector4::new(0.0, 0.0, 0.0, 1.0);
        // Center of the ortho volume: clip-space x/y at 0, depth inside [0,1]
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-4);
        assert!(origin.z > 0.0 && origin.z < 1.0);
    }

    #[test]
    fn light_matrix_tracks_the_sun_each_frame() {
        let config = ShadowConfig::default();
        let morning = light_matrix(Vec3::new(-1.0, -0.4, 0.0), 80.0, &config);
        let noon = light_matrix(Vec3::new(0.0, -1.0, 0.0), 120.0, &config);
        assert_ne!(morning, noon);
    }

    #[test]
    fn overhead_sun_does_not_degenerate() {
        let config = ShadowConfig::default();
        let vp = light_matrix(Vec3::new(0.0, -1.0, 0.0), 100.0, &config);
        // A well-formed matrix maps the origin into the volume
        let origin = vp * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!(origin.iter().all(|v| v.is_finite()));
    }
}
