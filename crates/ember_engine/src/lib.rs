//! # ember_engine
//!
//! A Vulkan renderer for dynamic outdoor scenes: terrain and models with a
//! sun-tracking shadow map, a refraction pre-pass for water surfaces,
//! registration-ordered particles, an offscreen-then-composite frame layout
//! and a load-preserving UI overlay pass.
//!
//! The renderer consumes a read-only [`scene::SceneSnapshot`] once per frame
//! and records a five-pass command stream (shadow, refraction, main scene,
//! composite, UI) with derived barriers between passes. The CPU runs up to
//! two frames ahead of the GPU behind a fence-and-ledger protocol; see
//! `render::vulkan::frame_sync`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ember_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new("scene", 1280, 720)?;
//!     let mut renderer = Renderer::new(&mut window, &config)?;
//!
//!     let snapshot = SceneSnapshot::empty();
//!     let inputs = FrameInputs {
//!         view: Mat4::identity(),
//!         proj: perspective_vk(1.0, 16.0 / 9.0, 0.1, 500.0),
//!         layers: LayerMask::OUTSIDE,
//!     };
//!     match renderer.draw_frame(&snapshot, &inputs)? {
//!         FrameOutcome::Presented => {}
//!         FrameOutcome::SwapchainStale => {
//!             let (w, h) = window.get_framebuffer_size();
//!             renderer.recreate_swapchain_resources(w, h)?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments
)]

pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::core::config::{RendererConfig, ShadowConfig};
    pub use crate::foundation::math::{look_at, perspective_vk, Mat4, Vec3};
    pub use crate::render::{
        FrameInputs, FrameOutcome, ProceduralSpec, RenderError, Renderer, UiOverlay, Window,
    };
    pub use crate::scene::{
        DrawItem, LayerMask, MeshHandle, ParticleBatch, ParticleBlend, ParticleInstance,
        SceneSnapshot, ShadingMode, SunLight, Vertex,
    };
}
