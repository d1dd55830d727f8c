//! Shader modules and graphics programs
//!
//! A [`GraphicsProgram`] is an immutable bundle of shader stages and
//! fixed-function state, built once at initialization from a declarative
//! [`ProgramConfig`]. Viewport, scissor and (where enabled) depth bias are
//! dynamic state, so programs survive swapchain resizes unchanged.

use ash::{vk, Device};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::context::{VulkanError, VulkanResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        let (prefix, words, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "SPIR-V bytecode is not properly aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load shader from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            VulkanError::InitializationFailed(format!(
                "Failed to open shader file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to read shader file: {}", e))
        })?;
        Self::from_bytes(device, &bytes)
    }

    /// Shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Blending modes for a program's color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// No blending
    Opaque,
    /// Standard alpha blending (smoke, UI-like surfaces)
    Alpha,
    /// Additive blending (fire, glow)
    Additive,
}

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull back faces
    Back,
    /// Cull front faces
    Front,
}

impl CullMode {
    fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Back => vk::CullModeFlags::BACK,
            Self::Front => vk::CullModeFlags::FRONT,
        }
    }
}

/// Vertex input shape consumed by a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInput {
    /// Static mesh vertices: position, normal, uv (stride 32)
    Mesh,
    /// Per-instance particle stream: position, size, color (stride 32);
    /// quad corners are derived from the vertex index in the shader
    ParticleInstances,
    /// No vertex buffers; geometry generated from the vertex index
    None,
}

/// Declarative configuration for one graphics program
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    /// Path to the vertex SPIR-V binary
    pub vertex_shader: String,
    /// Path to the fragment SPIR-V binary; depth-only programs have none
    pub fragment_shader: Option<String>,
    /// Face culling
    pub cull: CullMode,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writes
    pub depth_write: bool,
    /// Color blend mode (ignored for depth-only programs)
    pub blend: BlendMode,
    /// Enable dynamic depth bias (set per draw-call-set while recording)
    pub dynamic_depth_bias: bool,
    /// Vertex input shape
    pub vertex_input: VertexInput,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Push constant block size in bytes (0 for none)
    pub push_constant_size: u32,
    /// Stages reading the push constant block
    pub push_constant_stages: vk::ShaderStageFlags,
}

impl ProgramConfig {
    /// Opaque scene program, also used by the refraction pass
    pub fn scene(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            vertex_shader: shader_path("scene.vert.spv"),
            fragment_shader: Some(shader_path("scene.frag.spv")),
            cull: CullMode::Back,
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Opaque,
            dynamic_depth_bias: false,
            vertex_input: VertexInput::Mesh,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            push_constant_size: 80,
            push_constant_stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Depth-only shadow program with dynamic slope-scaled bias
    pub fn shadow_depth(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            vertex_shader: shader_path("shadow_depth.vert.spv"),
            fragment_shader: None,
            cull: CullMode::Front, // reduces peter-panning on closed meshes
            depth_test: true,
            depth_write: true,
            blend: BlendMode::Opaque,
            dynamic_depth_bias: true,
            vertex_input: VertexInput::Mesh,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            push_constant_size: 64,
            push_constant_stages: vk::ShaderStageFlags::VERTEX,
        }
    }

    /// Sky backdrop program (fullscreen triangle, no depth)
    pub fn sky(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            vertex_shader: shader_path("sky.vert.spv"),
            fragment_shader: Some(shader_path("sky.frag.spv")),
            cull: CullMode::None,
            depth_test: false,
            depth_write: false,
            blend: BlendMode::Opaque,
            dynamic_depth_bias: false,
            vertex_input: VertexInput::None,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            push_constant_size: 0,
            push_constant_stages: vk::ShaderStageFlags::empty(),
        }
    }

    /// Additive particle program
    pub fn particles_additive(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            blend: BlendMode::Additive,
            ..Self::particles_base(shader_path)
        }
    }

    /// Alpha-blended particle program
    pub fn particles_alpha(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            blend: BlendMode::Alpha,
            ..Self::particles_base(shader_path)
        }
    }

    fn particles_base(shader_path: impl Fn(&str) -> String) -> Self {
        Self {
            vertex_shader: shader_path("particle.vert.spv"),
            fragment_shader: Some(shader_path("particle.frag.spv")),
            cull: CullMode::None,
            depth_test: true,
            depth_write: false, // particles test but never occlude
            blend: BlendMode::Opaque,
            dynamic_depth_bias: false,
            vertex_input: VertexInput::ParticleInstances,
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            push_constant_size: 0,
            push_constant_stages: vk::ShaderStageFlags::empty(),
        }
    }
}

fn mesh_vertex_layout() -> (
    [vk::VertexInputBindingDescription; 1],
    Vec<vk::VertexInputAttributeDescription>,
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: 32,
        input_rate: vk::VertexInputRate::VERTEX,
    };
    let attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 12,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 24,
        },
    ];
    ([binding], attributes)
}

fn particle_vertex_layout() -> (
    [vk::VertexInputBindingDescription; 1],
    Vec<vk::VertexInputAttributeDescription>,
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: 32,
        input_rate: vk::VertexInputRate::INSTANCE,
    };
    let attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32_SFLOAT,
            offset: 12,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: 16,
        },
    ];
    ([binding], attributes)
}

/// Immutable compiled pipeline + layout, owned exclusively by the renderer
pub struct GraphicsProgram {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsProgram {
    /// Build a program against a render pass from its declarative config
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        config: &ProgramConfig,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Self> {
        let vertex_module = ShaderModule::from_file(device.clone(), &config.vertex_shader)?;
        let fragment_module = config
            .fragment_shader
            .as_ref()
            .map(|path| ShaderModule::from_file(device.clone(), path))
            .transpose()?;

        let entry = std::ffi::CStr::from_bytes_with_nul(b"main\0").unwrap();
        let mut shader_stages = vec![vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module.handle())
            .name(entry)
            .build()];
        if let Some(fragment) = &fragment_module {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(fragment.handle())
                    .name(entry)
                    .build(),
            );
        }

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(config.topology)
            .primitive_restart_enable(false);

        let (bindings, attributes) = match config.vertex_input {
            VertexInput::Mesh => {
                let (b, a) = mesh_vertex_layout();
                (b.to_vec(), a)
            }
            VertexInput::ParticleInstances => {
                let (b, a) = particle_vertex_layout();
                (b.to_vec(), a)
            }
            VertexInput::None => (Vec::new(), Vec::new()),
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        // Viewport and scissor are dynamic; counts only
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(config.cull.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(config.dynamic_depth_bias);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = match config.blend {
            BlendMode::Opaque => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build(),
            BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
            BlendMode::Additive => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build(),
        };
        let color_blend_attachments = [color_blend_attachment];
        let color_blending = if config.fragment_shader.is_some() {
            vk::PipelineColorBlendStateCreateInfo::builder()
                .logic_op_enable(false)
                .attachments(&color_blend_attachments)
        } else {
            // Depth-only: no color attachments
            vk::PipelineColorBlendStateCreateInfo::builder().logic_op_enable(false)
        };

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if config.dynamic_depth_bias {
            dynamic_states.push(vk::DynamicState::DEPTH_BIAS);
        }
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let push_constant_ranges = if config.push_constant_size > 0 {
            vec![vk::PushConstantRange {
                stage_flags: config.push_constant_stages,
                offset: 0,
                size: config.push_constant_size,
            }]
        } else {
            Vec::new()
        };
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        Ok(Self {
            device,
            pipeline: pipelines[0],
            layout,
        })
    }

    /// Pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsProgram {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> String {
        format!("target/shaders/{}", name)
    }

    #[test]
    fn scene_program_pushes_the_per_draw_block() {
        let config = ProgramConfig::scene(path);
        // model matrix + shading mode + flags + layer bits + burn factor
        assert_eq!(config.push_constant_size, 80);
        assert!(config.depth_write);
        assert_eq!(config.blend, BlendMode::Opaque);
    }

    #[test]
    fn shadow_program_is_depth_only_with_dynamic_bias() {
        let config = ProgramConfig::shadow_depth(path);
        assert!(config.fragment_shader.is_none());
        assert!(config.dynamic_depth_bias);
        assert!(config.depth_write);
    }

    #[test]
    fn particle_programs_differ_only_in_blend() {
        let additive = ProgramConfig::particles_additive(path);
        let alpha = ProgramConfig::particles_alpha(path);
        assert_eq!(additive.blend, BlendMode::Additive);
        assert_eq!(alpha.blend, BlendMode::Alpha);
        assert_eq!(additive.vertex_shader, alpha.vertex_shader);
        // Particles never write depth: accepted draw-order approximation
        assert!(!additive.depth_write && !alpha.depth_write);
        assert!(additive.depth_test && alpha.depth_test);
    }

    #[test]
    fn sky_program_ignores_depth_entirely() {
        let config = ProgramConfig::sky(path);
        assert!(!config.depth_test);
        assert!(!config.depth_write);
        assert_eq!(config.vertex_input, VertexInput::None);
    }
}
