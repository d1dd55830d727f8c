//! Vulkan rendering backend
//!
//! Leaf-first layout: owning resource wrappers at the bottom
//! (`buffer`, `texture`, `sync`), the frame protocol and barrier planning in
//! the middle (`frame_sync`, `barrier`), pass drivers above them, and the
//! orchestrator tying one `draw_frame` together at the top.

pub mod barrier;
pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod frame_sync;
pub mod framebuffer;
pub mod mesh;
pub mod orchestrator;
pub mod passes;
pub mod pipeline;
pub mod render_pass;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod texture_cache;
pub mod window;

pub use context::{VulkanContext, VulkanError, VulkanResult};
pub use orchestrator::Renderer;
pub use texture_cache::ProceduralSpec;
pub use window::{Window, WindowError};
