//! Declarative pass dependencies and mechanical barrier derivation
//!
//! Every pass declares what it reads and writes. The image-layout barriers
//! between passes are derived from that table instead of being hand-written
//! at each call site, so inserting a new pass cannot silently drop an
//! ordering edge.

use ash::vk;

/// Images flowing between passes within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResource {
    /// High-resolution depth-only shadow map
    ShadowDepth,
    /// Refraction color target
    RefractionColor,
    /// Main offscreen scene color target
    SceneColor,
    /// Depth buffer shared by the refraction and main passes
    SceneDepth,
    /// The acquired swapchain image
    SwapchainImage,
}

impl PassResource {
    fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            Self::ShadowDepth | Self::SceneDepth => vk::ImageAspectFlags::DEPTH,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// How a pass touches a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Written as a color attachment
    AttachmentWrite,
    /// Written as a depth attachment
    DepthAttachmentWrite,
    /// Sampled in the fragment stage
    ShaderRead,
    /// Source of a transfer (blit/copy)
    TransferRead,
    /// Destination of a transfer (blit/copy)
    TransferWrite,
}

impl Access {
    fn layout(self) -> vk::ImageLayout {
        match self {
            Self::AttachmentWrite => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthAttachmentWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::ShaderRead => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferRead => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferWrite => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    }

    fn stage(self) -> vk::PipelineStageFlags {
        match self {
            Self::AttachmentWrite => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            Self::DepthAttachmentWrite => vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            Self::ShaderRead => vk::PipelineStageFlags::FRAGMENT_SHADER,
            Self::TransferRead | Self::TransferWrite => vk::PipelineStageFlags::TRANSFER,
        }
    }

    fn access_mask(self) -> vk::AccessFlags {
        match self {
            Self::AttachmentWrite => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Self::DepthAttachmentWrite => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Self::ShaderRead => vk::AccessFlags::SHADER_READ,
            Self::TransferRead => vk::AccessFlags::TRANSFER_READ,
            Self::TransferWrite => vk::AccessFlags::TRANSFER_WRITE,
        }
    }
}

/// One pass's declared resource uses
#[derive(Debug, Clone, Copy)]
pub struct PassIo {
    /// Pass name for logs and plan debugging
    pub name: &'static str,
    /// Every resource the pass touches, with its access
    pub uses: &'static [(PassResource, Access)],
}

/// The frame's pass table, in execution order.
pub const FRAME_PASSES: [PassIo; 5] = [
    PassIo {
        name: "shadow",
        uses: &[(PassResource::ShadowDepth, Access::DepthAttachmentWrite)],
    },
    PassIo {
        name: "refraction",
        uses: &[
            (PassResource::RefractionColor, Access::AttachmentWrite),
            (PassResource::SceneDepth, Access::DepthAttachmentWrite),
        ],
    },
    PassIo {
        name: "main",
        uses: &[
            (PassResource::ShadowDepth, Access::ShaderRead),
            (PassResource::RefractionColor, Access::ShaderRead),
            (PassResource::SceneColor, Access::AttachmentWrite),
            (PassResource::SceneDepth, Access::DepthAttachmentWrite),
        ],
    },
    PassIo {
        name: "composite",
        uses: &[
            (PassResource::SceneColor, Access::TransferRead),
            (PassResource::SwapchainImage, Access::TransferWrite),
        ],
    },
    PassIo {
        name: "ui",
        uses: &[(PassResource::SwapchainImage, Access::AttachmentWrite)],
    },
];

/// A derived image-layout transition between two passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    /// The image being transitioned
    pub resource: PassResource,
    /// Index of the pass that produced the previous access, if any;
    /// `None` means the image enters the frame undefined
    pub after_pass: Option<usize>,
    /// Index of the pass the transition must precede
    pub before_pass: usize,
    /// Previous access; `None` maps to `UNDEFINED`
    pub from: Option<Access>,
    /// New access
    pub to: Access,
}

/// Derive the ordered transition list for a pass table.
///
/// A transition is emitted whenever a resource's access changes between its
/// consecutive uses. The swapchain image enters every frame with undefined
/// contents, so its first use also gets a transition from `UNDEFINED`.
pub fn plan_transitions(passes: &[PassIo]) -> Vec<ImageTransition> {
    let mut last_use: Vec<(PassResource, usize, Access)> = Vec::new();
    let mut transitions = Vec::new();

    for (pass_index, pass) in passes.iter().enumerate() {
        for &(resource, access) in pass.uses {
            let previous = last_use.iter().position(|(r, _, _)| *r == resource);
            match previous {
                None => {
                    // First touch. Attachments start in the layout their
                    // render pass declares; transfer destinations need an
                    // explicit transition out of UNDEFINED.
                    if access == Access::TransferWrite {
                        transitions.push(ImageTransition {
                            resource,
                            after_pass: None,
                            before_pass: pass_index,
                            from: None,
                            to: access,
                        });
                    }
                    last_use.push((resource, pass_index, access));
                }
                Some(entry) => {
                    let (_, prev_pass, prev_access) = last_use[entry];
                    if prev_access.layout() != access.layout() {
                        // Same-layout reuse needs no transition; any layout
                        // change between consecutive uses does.
                        transitions.push(ImageTransition {
                            resource,
                            after_pass: Some(prev_pass),
                            before_pass: pass_index,
                            from: Some(prev_access),
                            to: access,
                        });
                    }
                    last_use[entry] = (resource, pass_index, access);
                }
            }
        }
    }

    transitions
}

impl ImageTransition {
    /// Record this transition as a pipeline barrier on `image`
    pub fn record(&self, device: &ash::Device, command_buffer: vk::CommandBuffer, image: vk::Image) {
        let (src_stage, src_access, old_layout) = match self.from {
            Some(access) => (access.stage(), access.access_mask(), access.layout()),
            None => (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::AccessFlags::empty(),
                vk::ImageLayout::UNDEFINED,
            ),
        };

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(self.to.layout())
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.resource.aspect(),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(self.to.access_mask());

        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                self.to.stage(),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_plan() -> Vec<ImageTransition> {
        plan_transitions(&FRAME_PASSES)
    }

    #[test]
    fn refraction_output_becomes_sampleable_between_refraction_and_main() {
        let plan = frame_plan();
        let transition = plan
            .iter()
            .find(|t| t.resource == PassResource::RefractionColor)
            .expect("refraction transition must exist");
        // After all refraction draws (pass 1), before the first main draw
        // that samples it (pass 2) - for every recorded frame
        assert_eq!(transition.after_pass, Some(1));
        assert_eq!(transition.before_pass, 2);
        assert_eq!(transition.from, Some(Access::AttachmentWrite));
        assert_eq!(transition.to, Access::ShaderRead);
    }

    #[test]
    fn shadow_map_becomes_sampleable_before_the_main_pass() {
        let plan = frame_plan();
        let transition = plan
            .iter()
            .find(|t| t.resource == PassResource::ShadowDepth)
            .expect("shadow transition must exist");
        assert_eq!(transition.after_pass, Some(0));
        assert_eq!(transition.before_pass, 2);
        assert_eq!(transition.to, Access::ShaderRead);
    }

    #[test]
    fn swapchain_image_goes_undefined_copy_dest_then_attachment() {
        let plan = frame_plan();
        let swapchain: Vec<_> = plan
            .iter()
            .filter(|t| t.resource == PassResource::SwapchainImage)
            .collect();
        assert_eq!(swapchain.len(), 2);
        // Undefined -> copy destination before the composite pass
        assert_eq!(swapchain[0].from, None);
        assert_eq!(swapchain[0].to, Access::TransferWrite);
        assert_eq!(swapchain[0].before_pass, 3);
        // Copy destination -> renderable before the UI overlay pass
        assert_eq!(swapchain[1].from, Some(Access::TransferWrite));
        assert_eq!(swapchain[1].to, Access::AttachmentWrite);
        assert_eq!(swapchain[1].before_pass, 4);
    }

    #[test]
    fn shared_depth_needs_no_transition_between_refraction_and_main() {
        // Both passes use the depth image as a depth attachment; the render
        // passes agree on the layout, so the plan must not emit a barrier.
        let plan = frame_plan();
        assert!(plan.iter().all(|t| t.resource != PassResource::SceneDepth));
    }

    #[test]
    fn every_transition_is_ordered_after_its_producer() {
        for transition in frame_plan() {
            if let Some(after) = transition.after_pass {
                assert!(
                    after < transition.before_pass,
                    "{:?} must sit strictly between its producer and consumer",
                    transition
                );
            }
        }
    }

    #[test]
    fn inserting_a_pass_keeps_the_plan_well_ordered() {
        // A hypothetical bloom pass reading the scene color between main and
        // composite: derivation must re-route the scene color transition
        // without touching the shadow/refraction edges.
        const WITH_BLOOM: [PassIo; 6] = [
            FRAME_PASSES[0],
            FRAME_PASSES[1],
            FRAME_PASSES[2],
            PassIo {
                name: "bloom",
                uses: &[(PassResource::SceneColor, Access::ShaderRead)],
            },
            FRAME_PASSES[3],
            FRAME_PASSES[4],
        ];
        let plan = plan_transitions(&WITH_BLOOM);

        let scene_color: Vec<_> = plan
            .iter()
            .filter(|t| t.resource == PassResource::SceneColor)
            .collect();
        // attachment -> sampled (before bloom), sampled -> transfer src
        // (before composite)
        assert_eq!(scene_color.len(), 2);
        assert_eq!(scene_color[0].before_pass, 3);
        assert_eq!(scene_color[0].to, Access::ShaderRead);
        assert_eq!(scene_color[1].before_pass, 4);
        assert_eq!(scene_color[1].to, Access::TransferRead);

        for transition in &plan {
            if let Some(after) = transition.after_pass {
                assert!(after < transition.before_pass);
            }
        }
    }
}
