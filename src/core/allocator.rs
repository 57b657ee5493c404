mod memory;
mod plan;
mod suballocator;

pub use memory::{
    find_type, find_type_in, resolve, MemoryTypeError, MemoryTypes, MemoryUsage, PropertyFilter,
    BAR_CHAIN, DEVICE_CHAIN, STAGING_CHAIN,
};
pub use plan::{LayoutPlan, PlanError};
pub use suballocator::{Suballocator, MIN_ALIGNMENT};

use anyhow::Result;
use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::DeviceV1_1;

/// Allocates one memory object large enough for every buffer of
/// `plan` and binds each buffer at its planned offset.
///
/// # Safety
///
/// `buffers` must be valid, unbound buffers created on `device`,
/// in the order their requirements were pushed to `plan`. The
/// returned memory is owned by the caller and must be freed
/// after the buffers are destroyed.
pub unsafe fn allocate_and_bind_buffers(
    device: &Device,
    plan: &LayoutPlan,
    buffers: &[vk::Buffer],
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    // Build the bind infos first: a count mismatch is caught
    // before anything is allocated on the device.
    let mut bind_infos = plan.buffer_bind_infos(buffers, vk::DeviceMemory::null())?;

    let memory = device.allocate_memory(&plan.allocate_info(memory_type_index), None)?;
    info!(
        "Allocated {} bytes of memory type {} for {} buffers.",
        plan.allocation_size(), memory_type_index, buffers.len(),
    );

    for info in &mut bind_infos {
        info.memory = memory;
    }

    if let Err(error) = device.bind_buffer_memory2(bind_infos.as_slice()) {
        device.free_memory(memory, None);
        return Err(error.into());
    }

    Ok(memory)
}

/// Same as [`allocate_and_bind_buffers`], for images.
///
/// # Safety
///
/// Same requirements as [`allocate_and_bind_buffers`], with
/// images instead of buffers.
pub unsafe fn allocate_and_bind_images(
    device: &Device,
    plan: &LayoutPlan,
    images: &[vk::Image],
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    let mut bind_infos = plan.image_bind_infos(images, vk::DeviceMemory::null())?;

    let memory = device.allocate_memory(&plan.allocate_info(memory_type_index), None)?;
    info!(
        "Allocated {} bytes of memory type {} for {} images.",
        plan.allocation_size(), memory_type_index, images.len(),
    );

    for info in &mut bind_infos {
        info.memory = memory;
    }

    if let Err(error) = device.bind_image_memory2(bind_infos.as_slice()) {
        device.free_memory(memory, None);
        return Err(error.into());
    }

    Ok(memory)
}
