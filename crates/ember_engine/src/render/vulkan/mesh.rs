//! GPU mesh registry
//!
//! Owns the vertex and index buffers behind the scene's geometry handles.
//! Replacing a live mesh is device-idle gated by the orchestrator: there is
//! no per-resource fencing for hot swaps, trading a worst-case stall for
//! simplicity.

use slotmap::SlotMap;

use super::buffer::{IndexBuffer, VertexBuffer};
use super::context::{VulkanContext, VulkanError, VulkanResult};
use crate::scene::{MeshHandle, Vertex};

/// Uploaded mesh buffers
pub struct GpuMesh {
    /// Vertex data
    pub vertices: VertexBuffer,
    /// Index data
    pub indices: IndexBuffer,
}

/// Registry of uploaded meshes keyed by [`MeshHandle`]
pub struct MeshRegistry {
    meshes: SlotMap<MeshHandle, GpuMesh>,
}

impl MeshRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            meshes: SlotMap::with_key(),
        }
    }

    /// Upload a mesh and hand out its handle
    pub fn insert(
        &mut self,
        context: &VulkanContext,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> VulkanResult<MeshHandle> {
        let mesh = GpuMesh {
            vertices: VertexBuffer::new(context, vertices)?,
            indices: IndexBuffer::new(context, indices)?,
        };
        Ok(self.meshes.insert(mesh))
    }

    /// Replace the buffers behind an existing handle.
    ///
    /// Caller contract: a full device-idle wait has completed, so the old
    /// buffers are guaranteed off the GPU when they drop here.
    pub fn replace(
        &mut self,
        context: &VulkanContext,
        handle: MeshHandle,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> VulkanResult<()> {
        let slot = self
            .meshes
            .get_mut(handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "replace_mesh called with a stale mesh handle".to_string(),
            })?;
        *slot = GpuMesh {
            vertices: VertexBuffer::new(context, vertices)?,
            indices: IndexBuffer::new(context, indices)?,
        };
        Ok(())
    }

    /// Look up an uploaded mesh
    pub fn get(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle)
    }

    /// Number of uploaded meshes
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl Default for MeshRegistry {
    fn default() -> Self {
        Self::new()
    }
}
