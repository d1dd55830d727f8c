//! Frame orchestration
//!
//! [`Renderer`] owns every GPU object and runs the per-frame control flow:
//! acquire a slot and image, record shadow / refraction / main / composite /
//! UI in dependency order with derived barriers in between, submit, present.
//! A stale surface aborts the frame before submission; the caller rebuilds
//! the swapchain-dependent set and retries on the next frame.

use ash::vk;

use crate::core::config::RendererConfig;
use crate::foundation::math::Vec3;
use crate::render::{FrameInputs, FrameOutcome, RenderResult, UiOverlay};
use crate::scene::{MeshHandle, SceneSnapshot, Vertex};

use super::barrier::{plan_transitions, ImageTransition, PassResource, FRAME_PASSES};
use super::buffer::{InstanceBuffer, PerFrameUniform};
use super::commands::CommandPool;
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::frame_sync::{AcquireOutcome, FrameScheduler, PresentOutcome};
use super::framebuffer::{Framebuffer, OffscreenTarget, TargetPlan};
use super::mesh::MeshRegistry;
use super::passes::composite::record_blit;
use super::passes::main_scene::{layer_visible, MainSceneDriver};
use super::passes::particles::ParticleDriver;
use super::passes::refraction::RefractionPassDriver;
use super::passes::shadow::{light_matrix, ShadowPassDriver};
use super::passes::ui::record_overlay_pass;
use super::passes::FrameUniform;
use super::render_pass::RenderPass;
use super::swapchain::Swapchain;
use super::texture::Sampler;
use super::texture_cache::{ProceduralSpec, TextureCache};
use super::window::Window;

// Pass indices in FRAME_PASSES, used to place derived barriers
const PASS_SHADOW: usize = 0;
const PASS_REFRACTION: usize = 1;
const PASS_MAIN: usize = 2;
const PASS_COMPOSITE: usize = 3;
const PASS_UI: usize = 4;

/// The renderer: every pass driver, target and sync object behind one
/// `draw_frame` entry point.
pub struct Renderer {
    config: RendererConfig,

    // Sync and commands
    scheduler: FrameScheduler,
    command_buffers: Vec<vk::CommandBuffer>,
    current_slot: usize,

    // Per-slot frame data
    frame_uniforms: Vec<PerFrameUniform<FrameUniform>>,
    particle_buffers: Vec<InstanceBuffer>,
    frame_sets: Vec<vk::DescriptorSet>,

    // Pass drivers
    shadow_driver: ShadowPassDriver,
    refraction_driver: RefractionPassDriver,
    scene_driver: MainSceneDriver,
    particle_driver: ParticleDriver,

    // Shared resources
    meshes: MeshRegistry,
    textures: TextureCache,
    transitions: Vec<ImageTransition>,
    ui_overlay: Option<Box<dyn UiOverlay>>,

    // Swapchain-dependent targets
    ui_framebuffers: Vec<Framebuffer>,
    refraction_target: OffscreenTarget,
    scene_target: OffscreenTarget,
    shadow_target: OffscreenTarget,

    // Frame descriptor plumbing; owned so the sets stay valid
    _frame_pool: DescriptorPool,
    _frame_set_layout: DescriptorSetLayout,
    _shadow_sampler: Sampler,
    _refraction_sampler: Sampler,

    // Render passes
    scene_pass: RenderPass,
    refraction_pass: RenderPass,
    shadow_pass: RenderPass,
    ui_pass: RenderPass,

    command_pool: CommandPool,
    swapchain: Swapchain,
    context: VulkanContext,
}

impl Renderer {
    /// Initialize the full pipeline. Any GPU object creation failure is
    /// fatal; there is no partially degraded renderer.
    pub fn new(window: &mut Window, config: &RendererConfig) -> RenderResult<Self> {
        log::debug!("Initializing renderer...");
        let context = VulkanContext::new(
            window,
            &config.application_name,
            config.validation_enabled(),
        )?;

        let (width, height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(&context, vk::Extent2D { width, height })?;
        let plan = TargetPlan::derive(
            swapchain.extent(),
            swapchain.image_count(),
            swapchain.format().format,
        );

        let command_pool = CommandPool::new(&context)?;
        let command_buffers = command_pool.allocate(config.frames_in_flight as u32)?;

        let device = context.raw_device().clone();
        let scene_pass =
            RenderPass::new_scene_pass(device.clone(), plan.color_format, plan.depth_format)?;
        let refraction_pass =
            RenderPass::new_refraction_pass(device.clone(), plan.color_format, plan.depth_format)?;
        let shadow_pass = RenderPass::new_shadow_pass(device.clone(), plan.depth_format)?;
        let ui_pass = RenderPass::new_ui_overlay_pass(device.clone(), plan.color_format)?;

        let scene_target = OffscreenTarget::new_scene(
            &context,
            scene_pass.handle(),
            plan.extent,
            plan.color_format,
            plan.depth_format,
        )?;
        let scene_depth_view =
            scene_target
                .depth_view()
                .ok_or_else(|| VulkanError::InitializationFailed(
                    "scene target created without depth".to_string(),
                ))?;
        let refraction_target = OffscreenTarget::new_refraction(
            &context,
            refraction_pass.handle(),
            plan.extent,
            plan.color_format,
            scene_depth_view,
        )?;
        let shadow_target = OffscreenTarget::new_shadow(
            &context,
            shadow_pass.handle(),
            config.shadow.map_size,
            plan.depth_format,
        )?;
        let ui_framebuffers = Self::build_ui_framebuffers(&context, &ui_pass, &swapchain)?;

        let shadow_sampler = Sampler::shadow_map(&context)?;
        let refraction_sampler = Sampler::refraction(&context)?;

        // Frame descriptor set: uniform block + the two attachment samplers,
        // immutable so per-draw cost stays one set bind and one push.
        let frame_set_layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )
            .add_immutable_sampler(1, vk::ShaderStageFlags::FRAGMENT, shadow_sampler.handle())
            .add_immutable_sampler(
                2,
                vk::ShaderStageFlags::FRAGMENT,
                refraction_sampler.handle(),
            )
            .build(&device)?;

        let frames = config.frames_in_flight as u32;
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frames,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: frames * 2,
            },
        ];
        let mut frame_pool = DescriptorPool::new(&device, frames, &pool_sizes)?;

        let mut frame_uniforms = Vec::with_capacity(config.frames_in_flight);
        let mut particle_buffers = Vec::with_capacity(config.frames_in_flight);
        let mut frame_sets = Vec::with_capacity(config.frames_in_flight);
        for _ in 0..config.frames_in_flight {
            frame_uniforms.push(PerFrameUniform::<FrameUniform>::new(&context)?);
            particle_buffers.push(InstanceBuffer::new::<crate::scene::ParticleInstance>(
                &context,
                config.max_particle_instances,
            )?);
            frame_sets.push(frame_pool.allocate_set(frame_set_layout.handle())?);
        }

        let textures = TextureCache::new(&context, &command_pool, config.texture_pool_capacity)?;

        let shader_config = config.clone();
        let shader_path = move |name: &str| shader_config.shader_path(name);
        let set_layouts = [frame_set_layout.handle(), textures.set_layout()];
        let shadow_driver = ShadowPassDriver::new(
            device.clone(),
            shadow_pass.handle(),
            config.shadow.clone(),
            &shader_path,
        )?;
        let scene_driver = MainSceneDriver::new(
            device.clone(),
            scene_pass.handle(),
            &set_layouts,
            &shader_path,
        )?;
        let particle_driver = ParticleDriver::new(
            device.clone(),
            scene_pass.handle(),
            &set_layouts,
            &shader_path,
        )?;

        let scheduler =
            FrameScheduler::new(&context, config.frames_in_flight, swapchain.image_count())?;
        let transitions = plan_transitions(&FRAME_PASSES);

        let renderer = Self {
            config: config.clone(),
            scheduler,
            command_buffers,
            current_slot: 0,
            frame_uniforms,
            particle_buffers,
            frame_sets,
            shadow_driver,
            refraction_driver: RefractionPassDriver,
            scene_driver,
            particle_driver,
            meshes: MeshRegistry::new(),
            textures,
            transitions,
            ui_overlay: None,
            ui_framebuffers,
            refraction_target,
            scene_target,
            shadow_target,
            _frame_pool: frame_pool,
            _frame_set_layout: frame_set_layout,
            _shadow_sampler: shadow_sampler,
            _refraction_sampler: refraction_sampler,
            scene_pass,
            refraction_pass,
            shadow_pass,
            ui_pass,
            command_pool,
            swapchain,
            context,
        };
        renderer.write_frame_descriptor_sets();

        log::debug!("Renderer initialized");
        Ok(renderer)
    }

    fn build_ui_framebuffers(
        context: &VulkanContext,
        ui_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> VulkanResult<Vec<Framebuffer>> {
        swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    context.raw_device().clone(),
                    ui_pass.handle(),
                    &[view],
                    swapchain.extent(),
                )
            })
            .collect()
    }

    /// (Re)point every frame descriptor set at the uniform buffers and the
    /// current attachment views.
    fn write_frame_descriptor_sets(&self) {
        let device = self.context.raw_device();
        let shadow_view = self.shadow_target.depth_view();
        let refraction_view = self.refraction_target.color_view();

        for (set, uniform) in self.frame_sets.iter().zip(&self.frame_uniforms) {
            let buffer_info = vk::DescriptorBufferInfo::builder()
                .buffer(uniform.handle())
                .offset(0)
                .range(std::mem::size_of::<FrameUniform>() as vk::DeviceSize)
                .build();
            let buffer_infos = [buffer_info];

            let mut writes = vec![vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos)
                .build()];

            let shadow_info;
            let shadow_infos;
            if let Some(view) = shadow_view {
                shadow_info = vk::DescriptorImageInfo::builder()
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .image_view(view)
                    .build();
                shadow_infos = [shadow_info];
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(*set)
                        .dst_binding(1)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(&shadow_infos)
                        .build(),
                );
            }

            let refraction_info;
            let refraction_infos;
            if let Some(view) = refraction_view {
                refraction_info = vk::DescriptorImageInfo::builder()
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .image_view(view)
                    .build();
                refraction_infos = [refraction_info];
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(*set)
                        .dst_binding(2)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(&refraction_infos)
                        .build(),
                );
            }

            unsafe {
                device.update_descriptor_sets(&writes, &[]);
            }
        }
    }

    /// Render and present one frame from the given snapshot.
    ///
    /// Returns [`FrameOutcome::SwapchainStale`] when the surface is out of
    /// date; call [`Self::recreate_swapchain_resources`] before the next
    /// frame. The internal frame slot index advances only on submission, so
    /// an aborted frame makes no fence progress.
    pub fn draw_frame(
        &mut self,
        snapshot: &SceneSnapshot<'_>,
        inputs: &FrameInputs,
    ) -> RenderResult<FrameOutcome> {
        let slot = self.current_slot;

        let image_index =
            match self
                .scheduler
                .acquire_frame(&self.context, &self.swapchain, slot)?
            {
                AcquireOutcome::ImageReady(index) => index,
                AcquireOutcome::SurfaceStale => return Ok(FrameOutcome::SwapchainStale),
            };

        // Slot fence has signaled: its uniform region and command buffer
        // are ours again.
        self.write_frame_uniform(slot, snapshot, inputs);
        let particle_draws = self
            .particle_driver
            .upload(&self.particle_buffers[slot], snapshot.particles);

        let device = self.context.raw_device().clone();
        let cmd = self.command_buffers[slot];
        self.scheduler.begin_recording(slot)?;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        let swapchain_image = self.swapchain.images()[image_index as usize];
        let extent = self.swapchain.extent();
        let light_vp = light_matrix(
            snapshot.sun.direction,
            snapshot.sun.height,
            &self.config.shadow,
        );

        // Shadow pass
        self.apply_transitions_before(&device, cmd, PASS_SHADOW, swapchain_image);
        self.shadow_driver.record(
            &device,
            cmd,
            self.shadow_pass.handle(),
            self.shadow_target.framebuffer(),
            self.shadow_target.extent(),
            &self.meshes,
            snapshot.items,
            &light_vp,
        );

        // Refraction pass
        self.apply_transitions_before(&device, cmd, PASS_REFRACTION, swapchain_image);
        self.refraction_driver.record(
            &self.context,
            &self.command_pool,
            cmd,
            &self.scene_driver,
            self.refraction_pass.handle(),
            self.refraction_target.framebuffer(),
            extent,
            self.frame_sets[slot],
            &self.meshes,
            &mut self.textures,
            snapshot.items,
            inputs.layers,
            snapshot.clear_color,
        )?;

        // Main pass: sky, opaque items, particles
        self.apply_transitions_before(&device, cmd, PASS_MAIN, swapchain_image);
        {
            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: snapshot.clear_color,
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            ];
            let begin_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.scene_pass.handle())
                .framebuffer(self.scene_target.framebuffer())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            unsafe {
                device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            }

            self.scene_driver
                .record_sky(&device, cmd, extent, self.frame_sets[slot]);
            self.scene_driver.record_items(
                &self.context,
                &self.command_pool,
                cmd,
                extent,
                self.frame_sets[slot],
                &self.meshes,
                &mut self.textures,
                layer_visible(snapshot.items, inputs.layers),
                false,
            )?;
            self.particle_driver.record(
                &self.context,
                &self.command_pool,
                cmd,
                extent,
                self.frame_sets[slot],
                &self.particle_buffers[slot],
                snapshot.particles,
                &particle_draws,
                &mut self.textures,
            )?;

            unsafe {
                device.cmd_end_render_pass(cmd);
            }
        }

        // Composite: offscreen color into the acquired swapchain image
        self.apply_transitions_before(&device, cmd, PASS_COMPOSITE, swapchain_image);
        if let Some(scene_color) = self.scene_target.color_image() {
            record_blit(&device, cmd, scene_color, extent, swapchain_image, extent);
        }

        // UI overlay, load-preserving
        self.apply_transitions_before(&device, cmd, PASS_UI, swapchain_image);
        record_overlay_pass(
            &device,
            cmd,
            self.ui_pass.handle(),
            self.ui_framebuffers[image_index as usize].handle(),
            extent,
            self.ui_overlay.as_deref_mut(),
        );

        unsafe {
            device.end_command_buffer(cmd).map_err(VulkanError::Api)?;
        }

        let outcome = self.scheduler.submit_and_present(
            &self.context,
            &self.swapchain,
            cmd,
            slot,
            image_index,
        )?;
        self.current_slot = (slot + 1) % self.config.frames_in_flight;

        Ok(match outcome {
            PresentOutcome::Presented => FrameOutcome::Presented,
            PresentOutcome::SurfaceStale => FrameOutcome::SwapchainStale,
        })
    }

    fn write_frame_uniform(
        &mut self,
        slot: usize,
        snapshot: &SceneSnapshot<'_>,
        inputs: &FrameInputs,
    ) {
        let extent = self.swapchain.extent();
        let light_vp = light_matrix(
            snapshot.sun.direction,
            snapshot.sun.height,
            &self.config.shadow,
        );
        let camera: Vec3 = inputs.camera_position();
        let sun = &snapshot.sun;
        let uniform = FrameUniform {
            view: inputs.view.into(),
            proj: inputs.proj.into(),
            view_proj: (inputs.proj * inputs.view).into(),
            light_vp: light_vp.into(),
            camera_pos: [camera.x, camera.y, camera.z, 1.0],
            sun_direction: [
                sun.direction.x,
                sun.direction.y,
                sun.direction.z,
                sun.intensity,
            ],
            sun_color_ambient: [sun.color[0], sun.color[1], sun.color[2], sun.ambient],
            viewport: [extent.width as f32, extent.height as f32, 0.0, 0.0],
        };
        self.frame_uniforms[slot].write(&uniform);
    }

    fn apply_transitions_before(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        pass_index: usize,
        swapchain_image: vk::Image,
    ) {
        for transition in self
            .transitions
            .iter()
            .filter(|t| t.before_pass == pass_index)
        {
            let image = match transition.resource {
                PassResource::ShadowDepth => self.shadow_target.depth_image(),
                PassResource::RefractionColor => self.refraction_target.color_image(),
                PassResource::SceneColor => self.scene_target.color_image(),
                PassResource::SceneDepth => self.scene_target.depth_image(),
                PassResource::SwapchainImage => Some(swapchain_image),
            };
            let Some(image) = image else {
                continue;
            };
            transition.record(device, cmd, image);
        }
    }

    /// Rebuild everything that depends on the swapchain: the swapchain
    /// itself, the scene and refraction targets, the UI framebuffer set and
    /// per-image sync objects. Preceded by a full device-idle wait; the
    /// shadow target is resolution-independent and survives.
    pub fn recreate_swapchain_resources(&mut self, width: u32, height: u32) -> RenderResult<()> {
        log::debug!("Recreating swapchain resources at {}x{}", width, height);
        self.context.wait_idle()?;

        let new_swapchain = Swapchain::recreate(
            &self.context,
            vk::Extent2D { width, height },
            &self.swapchain,
        )?;
        self.swapchain = new_swapchain;

        let plan = TargetPlan::derive(
            self.swapchain.extent(),
            self.swapchain.image_count(),
            self.swapchain.format().format,
        );

        // Build the replacements first, then retire old targets in reverse
        // creation order: the old refraction framebuffer references the old
        // scene depth view and must go before it.
        let new_scene = OffscreenTarget::new_scene(
            &self.context,
            self.scene_pass.handle(),
            plan.extent,
            plan.color_format,
            plan.depth_format,
        )?;
        let scene_depth_view =
            new_scene
                .depth_view()
                .ok_or_else(|| VulkanError::InitializationFailed(
                    "scene target created without depth".to_string(),
                ))?;
        let new_refraction = OffscreenTarget::new_refraction(
            &self.context,
            self.refraction_pass.handle(),
            plan.extent,
            plan.color_format,
            scene_depth_view,
        )?;
        self.refraction_target = new_refraction;
        self.scene_target = new_scene;
        self.ui_framebuffers =
            Self::build_ui_framebuffers(&self.context, &self.ui_pass, &self.swapchain)?;

        self.scheduler
            .rebuild_for_swapchain(&self.context, self.swapchain.image_count())?;
        self.write_frame_descriptor_sets();

        Ok(())
    }

    /// Upload a mesh; the returned handle goes into draw items
    pub fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshHandle> {
        Ok(self.meshes.insert(&self.context, vertices, indices)?)
    }

    /// Replace a mesh's buffers. Stalls on a full device-idle wait first:
    /// there is no fine-grained per-resource fencing for hot swaps.
    pub fn replace_mesh(
        &mut self,
        handle: MeshHandle,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RenderResult<()> {
        self.context.wait_idle()?;
        Ok(self.meshes.replace(&self.context, handle, vertices, indices)?)
    }

    /// Register a procedural texture under a string key
    pub fn register_procedural_texture(
        &mut self,
        name: &str,
        spec: &ProceduralSpec,
    ) -> RenderResult<()> {
        Ok(self
            .textures
            .register_procedural(&self.context, &self.command_pool, name, spec)?)
    }

    /// Install (or replace) the UI overlay collaborator
    pub fn set_ui_overlay(&mut self, overlay: Box<dyn UiOverlay>) {
        self.ui_overlay = Some(overlay);
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> (u32, u32) {
        let extent = self.swapchain.extent();
        (extent.width, extent.height)
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> RenderResult<()> {
        Ok(self.context.wait_idle()?)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Targets, programs and buffers drop after this in reverse
        // declaration order; nothing may still be in flight.
        let _ = self.context.wait_idle();
    }
}
