use log::*;
use thiserror::Error;
use vulkanalia::prelude::v1_0::*;

use super::suballocator::Suballocator;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    #[error("Plan holds {planned} resources, but {given} were given.")]
    ResourceCountMismatch { planned: usize, given: usize },
    #[error("Resource {index} ends at byte {end}, past the {capacity} mapped bytes.")]
    OutOfBounds { index: usize, end: u64, capacity: u64 },
}

/// Placement of a batch of resources inside a single memory
/// object that does not exist yet.
///
/// Resources are pushed with their memory requirements and get
/// an offset each. Once every resource is in, the plan knows
/// how large the memory object has to be and which memory
/// types all resources accept, so the memory can be allocated
/// in one go and each resource bound at its offset.
#[derive(Debug, Clone)]
pub struct LayoutPlan {
    /// Offsets are relative to the start of the future memory
    /// object, so the base is always 0.
    suballocator: Suballocator,
    offsets: Vec<u64>,
    memory_type_bits: u32,
}

impl Default for LayoutPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutPlan {
    pub fn new() -> Self {
        Self {
            suballocator: Suballocator::new(0),
            offsets: Vec::new(),
            memory_type_bits: u32::MAX,
        }
    }

    /// Places a resource and returns its offset.
    pub fn push(&mut self, requirements: vk::MemoryRequirements) -> u64 {
        let offset = self.suballocator.allocate(requirements.size, requirements.alignment);

        // The memory object must have a type every resource
        // accepts, so only keep the types common to all of
        // them.
        self.memory_type_bits &= requirements.memory_type_bits;
        self.offsets.push(offset);

        trace!(
            "Placed resource {} at offset {:#x} (size {}, alignment {}).",
            self.offsets.len() - 1, offset, requirements.size, requirements.alignment,
        );

        offset
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of the memory object needed to hold every resource.
    pub fn allocation_size(&self) -> u64 {
        self.suballocator.allocated_size()
    }

    pub fn memory_type_bits(&self) -> u32 {
        self.memory_type_bits
    }

    pub fn allocate_info(&self, memory_type_index: u32) -> vk::MemoryAllocateInfo {
        vk::MemoryAllocateInfo::builder()
            .allocation_size(self.allocation_size())
            .memory_type_index(memory_type_index)
            .build()
    }

    pub fn buffer_bind_infos(
        &self,
        buffers: &[vk::Buffer],
        memory: vk::DeviceMemory,
    ) -> Result<Vec<vk::BindBufferMemoryInfo>, PlanError> {
        self.check_count(buffers.len())?;

        Ok(buffers
            .iter()
            .zip(&self.offsets)
            .map(|(&buffer, &offset)| {
                vk::BindBufferMemoryInfo::builder()
                    .buffer(buffer)
                    .memory(memory)
                    .memory_offset(offset)
                    .build()
            })
            .collect())
    }

    pub fn image_bind_infos(
        &self,
        images: &[vk::Image],
        memory: vk::DeviceMemory,
    ) -> Result<Vec<vk::BindImageMemoryInfo>, PlanError> {
        self.check_count(images.len())?;

        Ok(images
            .iter()
            .zip(&self.offsets)
            .map(|(&image, &offset)| {
                vk::BindImageMemoryInfo::builder()
                    .image(image)
                    .memory(memory)
                    .memory_offset(offset)
                    .build()
            })
            .collect())
    }

    /// Copies the data of each resource to its offset in
    /// `mapped`, which is expected to be the mapping of the
    /// whole memory object.
    pub fn copy_into(&self, mapped: &mut [u8], blobs: &[&[u8]]) -> Result<(), PlanError> {
        self.check_count(blobs.len())?;

        // Check everything first, so a failure leaves the
        // mapping untouched.
        let capacity = mapped.len() as u64;
        for (index, (blob, &offset)) in blobs.iter().zip(&self.offsets).enumerate() {
            let end = offset + blob.len() as u64;
            if end > capacity {
                return Err(PlanError::OutOfBounds { index, end, capacity });
            }
        }

        for (blob, &offset) in blobs.iter().zip(&self.offsets) {
            let start = offset as usize;
            mapped[start..start + blob.len()].copy_from_slice(blob);
        }

        Ok(())
    }

    fn check_count(&self, given: usize) -> Result<(), PlanError> {
        if given == self.offsets.len() {
            Ok(())
        } else {
            Err(PlanError::ResourceCountMismatch {
                planned: self.offsets.len(),
                given,
            })
        }
    }
}
