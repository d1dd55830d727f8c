//! Read-only per-frame scene projection
//!
//! The renderer never owns scene state. Once per frame the simulation side
//! hands it a [`SceneSnapshot`]: a borrowed, flattened view of everything
//! drawable, valid only for the duration of command recording.

use crate::foundation::math::{Mat4, Vec3};
use std::sync::Arc;

slotmap::new_key_type! {
    /// Opaque handle to a GPU mesh owned by the renderer's mesh registry
    pub struct MeshHandle;
}

bitflags::bitflags! {
    /// View-partitioning mask. A draw item is eligible for a frame when its
    /// layers intersect the mask the caller passes to `draw_frame`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LayerMask: u32 {
        /// Interior viewpoints (inside structures)
        const INSIDE = 0b01;
        /// Exterior viewpoints (open terrain)
        const OUTSIDE = 0b10;
    }
}

/// Shading classification of a draw item.
///
/// Drives both the fragment shading path and pass eligibility: the
/// refraction pass skips `SkyboxCombined`, `Flat`, `Wireframe` and `Water`
/// surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingMode {
    /// Full lighting with shadow and refraction sampling
    Standard,
    /// Unlit flat color
    Flat,
    /// Blended against the sky backdrop
    SkyboxCombined,
    /// Debug wireframe
    Wireframe,
    /// Water surface; samples the refraction target
    Water,
}

impl ShadingMode {
    /// Index pushed to the fragment shader's shading switch
    pub fn shader_index(self) -> u32 {
        match self {
            Self::Standard => 0,
            Self::Flat => 1,
            Self::SkyboxCombined => 2,
            Self::Wireframe => 3,
            Self::Water => 4,
        }
    }
}

/// One drawable object, projected from the scene store for this frame only.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// World transform
    pub transform: Mat4,
    /// Geometry to draw
    pub mesh: MeshHandle,
    /// Texture cache key; `None` uses the default texture
    pub texture: Option<Arc<str>>,
    /// Whether the item is drawn at all this frame
    pub visible: bool,
    /// Whether the item is rasterized into the shadow map
    pub casts_shadow: bool,
    /// Whether the item samples the shadow map when lit
    pub receives_shadow: bool,
    /// Shading classification
    pub shading: ShadingMode,
    /// View layers this item belongs to
    pub layers: LayerMask,
    /// Charring factor in [0, 1]; darkens the surface as it burns
    pub burn_factor: f32,
}

/// The scene's single directional light (the sun).
#[derive(Debug, Clone, Copy)]
pub struct SunLight {
    /// Normalized direction the light travels (towards the scene)
    pub direction: Vec3,
    /// Current height of the light above the world origin; the shadow
    /// volume is centered on the origin at this height
    pub height: f32,
    /// Light color
    pub color: [f32; 3],
    /// Direct intensity multiplier
    pub intensity: f32,
    /// Ambient term added to every lit surface
    pub ambient: f32,
}

impl Default for SunLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            height: 100.0,
            color: [1.0, 0.96, 0.9],
            intensity: 1.0,
            ambient: 0.25,
        }
    }
}

/// Blend program used for a particle batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleBlend {
    /// Additive blending (fire, sparks, glow)
    Additive,
    /// Standard alpha blending (smoke, dust)
    Alpha,
}

/// One GPU particle instance, laid out for the instanced vertex stream.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ParticleInstance {
    /// World position of the particle center
    pub position: [f32; 3],
    /// Billboard half-size in world units
    pub size: f32,
    /// Premodulated particle color
    pub color: [f32; 4],
}

unsafe impl bytemuck::Pod for ParticleInstance {}
unsafe impl bytemuck::Zeroable for ParticleInstance {}

/// One emitter's worth of particles for this frame.
///
/// Batches are drawn in the order they appear in the snapshot, which is the
/// order emitters registered. There is no per-particle depth sort.
#[derive(Debug, Clone)]
pub struct ParticleBatch {
    /// Blend program for the whole batch
    pub blend: ParticleBlend,
    /// Texture cache key; `None` uses the default texture
    pub texture: Option<Arc<str>>,
    /// Instances, already in emission order
    pub instances: Vec<ParticleInstance>,
}

/// Vertex format for registry meshes
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

/// Everything the renderer reads from the outside world for one frame.
#[derive(Debug, Clone)]
pub struct SceneSnapshot<'a> {
    /// Drawable objects, borrowed for the duration of command recording
    pub items: &'a [DrawItem],
    /// Particle batches in emission-registration order
    pub particles: &'a [ParticleBatch],
    /// The sun
    pub sun: SunLight,
    /// Main pass clear color
    pub clear_color: [f32; 4],
}

impl<'a> SceneSnapshot<'a> {
    /// A snapshot with no objects and no particles; still renders sky and UI.
    pub fn empty() -> Self {
        Self {
            items: &[],
            particles: &[],
            sun: SunLight::default(),
            clear_color: [0.05, 0.07, 0.12, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_masks_intersect_as_expected() {
        let inside = LayerMask::INSIDE;
        let both = LayerMask::INSIDE | LayerMask::OUTSIDE;
        assert!(inside.intersects(both));
        assert!(!inside.intersects(LayerMask::OUTSIDE));
    }

    #[test]
    fn empty_snapshot_has_no_drawables() {
        let snapshot = SceneSnapshot::empty();
        assert!(snapshot.items.is_empty());
        assert!(snapshot.particles.is_empty());
    }

    #[test]
    fn particle_instance_layout_matches_shader_stride() {
        // binding stride in the particle program is 32 bytes
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 32);
    }

    #[test]
    fn vertex_layout_matches_shader_stride() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }
}
