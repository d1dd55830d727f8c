//! Rendering subsystem
//!
//! The public surface is [`vulkan::Renderer`]: initialize once, call
//! `draw_frame` with a scene snapshot every frame, recreate the
//! swapchain-dependent resources on resize or when a frame reports the
//! surface stale.

pub mod vulkan;

use ash::vk;
use thiserror::Error;

use crate::foundation::math::{Mat4, Vec3};
use crate::scene::LayerMask;
use vulkan::context::VulkanError;
use vulkan::window::WindowError;

/// Top-level rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// Vulkan-layer failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Windowing failure
    #[error(transparent)]
    Window(#[from] WindowError),
}

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// What happened to a submitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame rendered and presented
    Presented,
    /// The surface is stale. If the frame was dropped before submission no
    /// fence progressed; either way the caller must call
    /// `recreate_swapchain_resources` before the next frame.
    SwapchainStale,
}

/// Camera and view-partitioning inputs for one frame, produced by the
/// external camera collaborator.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs {
    /// View matrix
    pub view: Mat4,
    /// Projection matrix (Vulkan clip conventions)
    pub proj: Mat4,
    /// Layers eligible this frame
    pub layers: LayerMask,
}

impl FrameInputs {
    /// Camera world position, recovered from the view matrix
    pub fn camera_position(&self) -> Vec3 {
        self.view
            .try_inverse()
            .map(|inv| Vec3::new(inv[(0, 3)], inv[(1, 3)], inv[(2, 3)]))
            .unwrap_or_else(Vec3::zeros)
    }
}

/// Seam to the external UI collaborator.
///
/// The overlay pass hands the implementation an open, load-preserving
/// render pass over the composited swapchain image; the implementation
/// records its own draws and nothing else.
pub trait UiOverlay {
    /// Record UI draws into the open render pass
    fn record(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D);
}

pub use vulkan::orchestrator::Renderer;
pub use vulkan::texture_cache::ProceduralSpec;
pub use vulkan::window::Window;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::look_at;
    use approx::assert_relative_eq;

    #[test]
    fn camera_position_round_trips_through_the_view_matrix() {
        let eye = Vec3::new(5.0, 2.0, -3.0);
        let inputs = FrameInputs {
            view: look_at(eye, Vec3::zeros(), Vec3::y()),
            proj: Mat4::identity(),
            layers: LayerMask::OUTSIDE,
        };
        let recovered = inputs.camera_position();
        assert_relative_eq!(recovered.x, eye.x, epsilon = 1e-4);
        assert_relative_eq!(recovered.y, eye.y, epsilon = 1e-4);
        assert_relative_eq!(recovered.z, eye.z, epsilon = 1e-4);
    }
}
