//! Offscreen render targets and framebuffers
//!
//! Targets are created at initialization and on resize, destroyed in reverse
//! creation order, and only ever torn down behind a full device-idle wait.

use ash::{vk, Device};

use super::context::{VulkanContext, VulkanError, VulkanResult};

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over the given attachments
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// Framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Owned 2D image with bound memory and a view
struct OwnedImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl OwnedImage {
    fn new(
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device().clone();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = context.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
        })
    }
}

impl Drop for OwnedImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Color + optional depth render target with its framebuffer.
///
/// Three flavors exist per renderer: the main scene target (color + depth,
/// color is the composite blit source), the refraction target (own color,
/// borrows the scene depth), and the shadow target (depth only, sampled).
pub struct OffscreenTarget {
    color: Option<OwnedImage>,
    depth: Option<OwnedImage>,
    framebuffer: Framebuffer,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl OffscreenTarget {
    /// Main scene target: color (blit source) + fresh depth image.
    pub fn new_scene(
        context: &VulkanContext,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let color = OwnedImage::new(
            context,
            extent,
            color_format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
        )?;
        let depth = OwnedImage::new(
            context,
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;
        let framebuffer = Framebuffer::new(
            context.raw_device().clone(),
            render_pass,
            &[color.view, depth.view],
            extent,
        )?;
        Ok(Self {
            color: Some(color),
            depth: Some(depth),
            framebuffer,
            extent,
            format: color_format,
        })
    }

    /// Refraction target: own sampled color image, scene depth borrowed for
    /// the framebuffer.
    pub fn new_refraction(
        context: &VulkanContext,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        color_format: vk::Format,
        shared_depth_view: vk::ImageView,
    ) -> VulkanResult<Self> {
        let color = OwnedImage::new(
            context,
            extent,
            color_format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
        )?;
        let framebuffer = Framebuffer::new(
            context.raw_device().clone(),
            render_pass,
            &[color.view, shared_depth_view],
            extent,
        )?;
        Ok(Self {
            color: Some(color),
            depth: None,
            framebuffer,
            extent,
            format: color_format,
        })
    }

    /// Shadow target: square depth-only image, sampled by the main pass.
    pub fn new_shadow(
        context: &VulkanContext,
        render_pass: vk::RenderPass,
        size: u32,
        depth_format: vk::Format,
    ) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let depth = OwnedImage::new(
            context,
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::DEPTH,
        )?;
        let framebuffer = Framebuffer::new(
            context.raw_device().clone(),
            render_pass,
            &[depth.view],
            extent,
        )?;
        Ok(Self {
            color: None,
            depth: Some(depth),
            framebuffer,
            extent,
            format: depth_format,
        })
    }

    /// Framebuffer handle
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Color image handle, if this target has one
    pub fn color_image(&self) -> Option<vk::Image> {
        self.color.as_ref().map(|c| c.image)
    }

    /// Color view, if this target has one
    pub fn color_view(&self) -> Option<vk::ImageView> {
        self.color.as_ref().map(|c| c.view)
    }

    /// Depth image handle, if this target owns one
    pub fn depth_image(&self) -> Option<vk::Image> {
        self.depth.as_ref().map(|d| d.image)
    }

    /// Depth view, if this target owns one
    pub fn depth_view(&self) -> Option<vk::ImageView> {
        self.depth.as_ref().map(|d| d.view)
    }

    /// Target extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Primary attachment format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

/// Extent-derived plan for the swapchain-dependent resource set.
///
/// A pure function of (extent, image count, formats), so recreating with an
/// unchanged extent provably yields an identical resource shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPlan {
    /// Extent shared by the scene and refraction targets
    pub extent: vk::Extent2D,
    /// Color format shared by offscreen targets and the swapchain
    pub color_format: vk::Format,
    /// Depth format for scene and shadow targets
    pub depth_format: vk::Format,
    /// Number of UI framebuffers (one per swapchain image)
    pub ui_framebuffer_count: usize,
}

impl TargetPlan {
    /// Derive the plan for a swapchain state
    pub fn derive(extent: vk::Extent2D, image_count: usize, color_format: vk::Format) -> Self {
        Self {
            extent,
            color_format,
            depth_format: vk::Format::D32_SFLOAT,
            ui_framebuffer_count: image_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_plan_is_idempotent_for_equal_extents() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let a = TargetPlan::derive(extent, 3, vk::Format::B8G8R8A8_SRGB);
        let b = TargetPlan::derive(extent, 3, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(a, b);
    }

    #[test]
    fn target_plan_tracks_image_count() {
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let plan = TargetPlan::derive(extent, 2, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(plan.ui_framebuffer_count, 2);
        assert_eq!(plan.depth_format, vk::Format::D32_SFLOAT);
    }
}
