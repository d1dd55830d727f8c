//! UI overlay pass
//!
//! One load-preserving render pass over the swapchain image. Draw
//! submission is delegated to the external UI collaborator; this pass only
//! exists in the core because its framebuffers must be recreated in
//! lockstep with the swapchain.

use ash::vk;

use crate::render::UiOverlay;

use super::set_viewport;

/// Record the overlay pass, delegating draws to `overlay` when present.
///
/// The pass begins and ends even with no overlay installed: it performs the
/// final transition of the swapchain image to present layout.
pub fn record_overlay_pass(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    overlay: Option<&mut (dyn UiOverlay + '_)>,
) {
    // Load-preserving: no clear values
    let begin_info = vk::RenderPassBeginInfo::builder()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

    unsafe {
        device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
    }
    set_viewport(device, cmd, extent);

    if let Some(overlay) = overlay {
        overlay.record(device, cmd, extent);
    }

    unsafe {
        device.cmd_end_render_pass(cmd);
    }
}
