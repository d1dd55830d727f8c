//! Particle draws, appended into the main scene pass
//!
//! Two programs, additive and alpha-blended. Instance data streams into the
//! frame slot's mapped instance buffer; batches draw in the order emitters
//! registered them. There is no depth sort; the blending modes keep the
//! approximation acceptable.

use ash::vk;

use crate::scene::{ParticleBatch, ParticleBlend, ParticleInstance};

use super::super::buffer::InstanceBuffer;
use super::super::commands::CommandPool;
use super::super::context::{VulkanContext, VulkanResult};
use super::super::pipeline::{GraphicsProgram, ProgramConfig};
use super::super::texture_cache::TextureCache;
use super::set_viewport;

/// One batch's slice of the instance buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDraw {
    /// Index of the batch in the snapshot (registration order)
    pub batch_index: usize,
    /// Blend program selection
    pub blend: ParticleBlend,
    /// First instance slot in the buffer
    pub first: u32,
    /// Instances to draw
    pub count: u32,
}

/// Lay batches out in the instance buffer, preserving registration order.
///
/// Returns the draw list and how many instances were dropped to the
/// capacity cap.
pub fn plan_batches(batches: &[ParticleBatch], capacity: u32) -> (Vec<BatchDraw>, u32) {
    let mut draws = Vec::new();
    let mut cursor = 0u32;
    let mut dropped = 0u32;

    for (batch_index, batch) in batches.iter().enumerate() {
        let requested = batch.instances.len() as u32;
        let room = capacity.saturating_sub(cursor);
        let count = requested.min(room);
        dropped += requested - count;
        if count == 0 {
            continue;
        }
        draws.push(BatchDraw {
            batch_index,
            blend: batch.blend,
            first: cursor,
            count,
        });
        cursor += count;
    }

    (draws, dropped)
}

/// Particle draw driver; owns both blend-mode programs
pub struct ParticleDriver {
    additive: GraphicsProgram,
    alpha: GraphicsProgram,
}

impl ParticleDriver {
    /// Build both particle programs against the scene render pass
    pub fn new(
        device: ash::Device,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
        shader_path: impl Fn(&str) -> String + Copy,
    ) -> VulkanResult<Self> {
        let additive = GraphicsProgram::new(
            device.clone(),
            render_pass,
            &ProgramConfig::particles_additive(shader_path),
            set_layouts,
        )?;
        let alpha = GraphicsProgram::new(
            device,
            render_pass,
            &ProgramConfig::particles_alpha(shader_path),
            set_layouts,
        )?;
        Ok(Self { additive, alpha })
    }

    /// Copy this frame's instances into the slot's mapped buffer and return
    /// the draw list.
    pub fn upload(
        &self,
        buffer: &InstanceBuffer,
        batches: &[ParticleBatch],
    ) -> Vec<BatchDraw> {
        let (draws, dropped) = plan_batches(batches, buffer.capacity());
        if dropped > 0 {
            log::warn!(
                "Dropping {} particle instances over the {}-instance budget",
                dropped,
                buffer.capacity()
            );
        }
        for draw in &draws {
            let instances: &[ParticleInstance] =
                &batches[draw.batch_index].instances[..draw.count as usize];
            buffer.write_at(draw.first, instances);
        }
        draws
    }

    /// Record the particle draws inside the already-open main render pass
    pub fn record(
        &self,
        context: &VulkanContext,
        command_pool: &CommandPool,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        frame_set: vk::DescriptorSet,
        buffer: &InstanceBuffer,
        batches: &[ParticleBatch],
        draws: &[BatchDraw],
        textures: &mut TextureCache,
    ) -> VulkanResult<()> {
        let device = context.raw_device();

        for draw in draws {
            let program = match draw.blend {
                ParticleBlend::Additive => &self.additive,
                ParticleBlend::Alpha => &self.alpha,
            };
            let texture_key = batches[draw.batch_index].texture.as_deref();
            let texture_set = textures.descriptor_for(context, command_pool, texture_key)?;

            unsafe {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, program.handle());
            }
            set_viewport(device, cmd, extent);
            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    program.layout(),
                    0,
                    &[frame_set, texture_set],
                    &[],
                );
                device.cmd_bind_vertex_buffers(
                    cmd,
                    0,
                    &[buffer.handle()],
                    &[buffer.byte_offset(draw.first)],
                );
                // 4 strip vertices expanded per instance in the vertex shader
                device.cmd_draw(cmd, 4, draw.count, 0, 0);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(blend: ParticleBlend, count: usize) -> ParticleBatch {
        ParticleBatch {
            blend,
            texture: None,
            instances: vec![
                ParticleInstance {
                    position: [0.0; 3],
                    size: 1.0,
                    color: [1.0; 4],
                };
                count
            ],
        }
    }

    #[test]
    fn batches_keep_registration_order() {
        let batches = vec![
            batch(ParticleBlend::Alpha, 3),
            batch(ParticleBlend::Additive, 2),
            batch(ParticleBlend::Alpha, 4),
        ];
        let (draws, dropped) = plan_batches(&batches, 100);
        assert_eq!(dropped, 0);
        assert_eq!(
            draws.iter().map(|d| d.batch_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // Contiguous, non-overlapping slices
        assert_eq!(draws[0].first, 0);
        assert_eq!(draws[1].first, 3);
        assert_eq!(draws[2].first, 5);
    }

    #[test]
    fn overflow_truncates_and_reports() {
        let batches = vec![
            batch(ParticleBlend::Additive, 6),
            batch(ParticleBlend::Alpha, 6),
        ];
        let (draws, dropped) = plan_batches(&batches, 8);
        assert_eq!(dropped, 4);
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].count, 2);
    }

    #[test]
    fn empty_batches_produce_no_draws() {
        let batches = vec![batch(ParticleBlend::Alpha, 0)];
        let (draws, dropped) = plan_batches(&batches, 8);
        assert!(draws.is_empty());
        assert_eq!(dropped, 0);
    }
}
