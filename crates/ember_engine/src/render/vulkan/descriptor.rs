//! Descriptor set layouts and pools
//!
//! The texture pool has a hard, configured capacity. Running out is a typed
//! fatal error rather than a silent reallocation; there is deliberately no
//! growth or eviction strategy in this renderer.

use ash::vk;

use super::context::{VulkanError, VulkanResult};

/// Builder for descriptor set layouts
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    immutable_samplers: Vec<Vec<vk::Sampler>>,
}

impl DescriptorSetLayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            immutable_samplers: Vec::new(),
        }
    }

    /// Add a uniform buffer binding
    pub fn add_uniform_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stages)
                .build(),
        );
        self.immutable_samplers.push(Vec::new());
        self
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stages)
                .build(),
        );
        self.immutable_samplers.push(Vec::new());
        self
    }

    /// Add a combined image sampler binding with an immutable sampler baked
    /// into the layout. The attachment samplers (shadow map, refraction) are
    /// established once at initialization and never rebound per draw.
    pub fn add_immutable_sampler(
        mut self,
        binding: u32,
        stages: vk::ShaderStageFlags,
        sampler: vk::Sampler,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stages)
                .build(),
        );
        self.immutable_samplers.push(vec![sampler]);
        self
    }

    /// Build the layout
    pub fn build(mut self, device: &ash::Device) -> VulkanResult<DescriptorSetLayout> {
        for (binding, samplers) in self.bindings.iter_mut().zip(&self.immutable_samplers) {
            if !samplers.is_empty() {
                binding.p_immutable_samplers = samplers.as_ptr();
            }
        }

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    device: ash::Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Fixed-capacity descriptor pool
pub struct DescriptorPool {
    device: ash::Device,
    pool: vk::DescriptorPool,
    capacity: u32,
    allocated: u32,
}

impl DescriptorPool {
    /// Create a pool able to hold `capacity` sets of the given sizes
    pub fn new(
        device: &ash::Device,
        capacity: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(capacity)
            .pool_sizes(pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: device.clone(),
            pool,
            capacity,
            allocated: 0,
        })
    }

    /// Allocate one descriptor set, failing with `DescriptorPoolExhausted`
    /// at capacity
    pub fn allocate_set(&mut self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        if self.allocated >= self.capacity {
            return Err(VulkanError::DescriptorPoolExhausted {
                capacity: self.capacity,
            });
        }

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| match e {
                    vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                        VulkanError::DescriptorPoolExhausted {
                            capacity: self.capacity,
                        }
                    }
                    other => VulkanError::Api(other),
                })?
        };

        self.allocated += 1;
        Ok(sets[0])
    }

    /// Configured capacity
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Sets handed out so far
    pub fn allocated(&self) -> u32 {
        self.allocated
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
