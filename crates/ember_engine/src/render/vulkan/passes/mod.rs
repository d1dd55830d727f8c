//! Pass drivers
//!
//! One driver per render pass. Each binds its program(s), filters the
//! snapshot's draw items and issues draws; the item filters are plain
//! functions so pass eligibility is testable without a device. Ordering
//! between passes is owned by the orchestrator and the derived barrier plan,
//! not by the drivers.

pub mod composite;
pub mod main_scene;
pub mod particles;
pub mod refraction;
pub mod shadow;
pub mod ui;

use ash::vk;

/// Per-frame uniform block shared by every program (set 0, binding 0).
///
/// Written once per frame into the slot's persistently mapped buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameUniform {
    /// Camera view matrix
    pub view: [[f32; 4]; 4],
    /// Camera projection matrix
    pub proj: [[f32; 4]; 4],
    /// Premultiplied view-projection
    pub view_proj: [[f32; 4]; 4],
    /// Sun view-projection for shadow coordinate reconstruction
    pub light_vp: [[f32; 4]; 4],
    /// Camera world position (w unused)
    pub camera_pos: [f32; 4],
    /// xyz: normalized sun travel direction, w: direct intensity
    pub sun_direction: [f32; 4],
    /// rgb: sun color, a: ambient term
    pub sun_color_ambient: [f32; 4],
    /// xy: viewport size in pixels (for refraction screen-space lookup),
    /// zw: unused
    pub viewport: [f32; 4],
}

unsafe impl bytemuck::Pod for FrameUniform {}
unsafe impl bytemuck::Zeroable for FrameUniform {}

/// Per-draw push constant block for the scene and refraction passes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ScenePush {
    /// Model matrix
    pub model: [[f32; 4]; 4],
    /// Shading mode switch
    pub shading: u32,
    /// Bit flags, see `push_flags`
    pub flags: u32,
    /// Layer bits the item belongs to
    pub layers: u32,
    /// Charring factor
    pub burn: f32,
}

unsafe impl bytemuck::Pod for ScenePush {}
unsafe impl bytemuck::Zeroable for ScenePush {}

/// Flag bits in [`ScenePush::flags`]
pub mod push_flags {
    /// Item samples the shadow map
    pub const RECEIVES_SHADOW: u32 = 1 << 0;
    /// Reduced shading: skip shadow and refraction sampling (used while
    /// rendering *into* the refraction target)
    pub const REDUCED_SHADING: u32 = 1 << 1;
}

/// Push constant block for the depth-only shadow program.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ShadowPush {
    /// Premultiplied light view-projection * model
    pub light_mvp: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for ShadowPush {}
unsafe impl bytemuck::Zeroable for ShadowPush {}

/// Set dynamic viewport and scissor covering `extent`
pub(crate) fn set_viewport(device: &ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    unsafe {
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_push_matches_program_push_constant_size() {
        // ProgramConfig::scene declares an 80-byte block
        assert_eq!(std::mem::size_of::<ScenePush>(), 80);
    }

    #[test]
    fn shadow_push_matches_program_push_constant_size() {
        assert_eq!(std::mem::size_of::<ShadowPush>(), 64);
    }

    #[test]
    fn frame_uniform_is_16_byte_aligned_throughout() {
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
    }
}
