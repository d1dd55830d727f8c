//! Composite step: offscreen scene color into the swapchain image
//!
//! A GPU-side blit, not a render pass. The surrounding layout transitions
//! (scene color to transfer source, swapchain image out of undefined and
//! then into attachment layout for the UI pass) come from the derived
//! barrier plan; this module only records the copy itself. Rendering
//! offscreen and blitting keeps the door open for inserted post-process
//! steps without re-deriving the main render pass.

use ash::vk;

/// Record the blit from the scene color target to the swapchain image.
///
/// Extents are normally identical; the blit still expresses both so a
/// size-mismatched frame during resize settles gracefully.
pub fn record_blit(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_image: vk::Image,
    src_extent: vk::Extent2D,
    dst_image: vk::Image,
    dst_extent: vk::Extent2D,
) {
    let subresource = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };

    let blit = vk::ImageBlit {
        src_subresource: subresource,
        src_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_extent.width as i32,
                y: src_extent.height as i32,
                z: 1,
            },
        ],
        dst_subresource: subresource,
        dst_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_extent.width as i32,
                y: dst_extent.height as i32,
                z: 1,
            },
        ],
    };

    unsafe {
        device.cmd_blit_image(
            cmd,
            src_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::NEAREST,
        );
    }
}
