use std::fmt;

use lazy_static::lazy_static;
use log::*;
use thiserror::Error;
use vulkanalia::prelude::v1_0::*;

use crate::config::Config;

/// What a memory object will be used for. Each usage has its
/// own fallback chain of memory properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUsage {
    /// Resources only accessed by the GPU.
    Device,
    /// Host-visible memory used to upload data to the GPU.
    Staging,
    /// Device-local memory that is also host-visible (the
    /// "base address register" window of the GPU).
    Bar,
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryUsage::Device => "device",
            MemoryUsage::Staging => "staging",
            MemoryUsage::Bar => "bar",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTypeError {
    #[error("No suitable memory type for {0} memory.")]
    NotFound(MemoryUsage),
}

/// One step of a fallback chain: a memory type matches if its
/// property flags contain all of `inclusive` and none of
/// `exclusive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyFilter {
    pub inclusive: vk::MemoryPropertyFlags,
    pub exclusive: vk::MemoryPropertyFlags,
}

impl PropertyFilter {
    pub fn new(
        inclusive: vk::MemoryPropertyFlags,
        exclusive: vk::MemoryPropertyFlags,
    ) -> Self {
        Self { inclusive, exclusive }
    }

    pub fn matches(&self, properties: vk::MemoryPropertyFlags) -> bool {
        properties.contains(self.inclusive) && !properties.intersects(self.exclusive)
    }
}

lazy_static! {
    /// Device memory: prefer a type that is device-local and
    /// nothing else, then accept anything device-local that is
    /// not host-cached.
    pub static ref DEVICE_CHAIN: Vec<PropertyFilter> = {
        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        vec![
            PropertyFilter::new(local, vk::MemoryPropertyFlags::all() - local),
            PropertyFilter::new(local, vk::MemoryPropertyFlags::HOST_CACHED),
        ]
    };

    /// Staging memory: host memory first (uncached, then
    /// cached), and only then host-visible device memory.
    pub static ref STAGING_CHAIN: Vec<PropertyFilter> = {
        let visible = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let cached = vk::MemoryPropertyFlags::HOST_CACHED;
        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let none = vk::MemoryPropertyFlags::empty();
        vec![
            PropertyFilter::new(visible, local),
            PropertyFilter::new(visible | cached, local),
            PropertyFilter::new(local | visible, none),
            PropertyFilter::new(local | visible | cached, none),
        ]
    };

    /// BAR memory: host-visible device memory, uncached first.
    pub static ref BAR_CHAIN: Vec<PropertyFilter> = {
        let visible = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let cached = vk::MemoryPropertyFlags::HOST_CACHED;
        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        let none = vk::MemoryPropertyFlags::empty();
        vec![
            PropertyFilter::new(visible | local, cached),
            PropertyFilter::new(visible | cached | local, none),
            PropertyFilter::new(local | visible, none),
            PropertyFilter::new(local | visible | cached, none),
        ]
    };
}

/// Finds the first memory type whose properties pass `filter`.
pub fn find_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    filter: PropertyFilter,
) -> Option<u32> {
    find_type_in(properties, u32::MAX, filter)
}

/// Same as [`find_type`], restricted to the memory types set in
/// `type_bits` (the `memory_type_bits` field of memory
/// requirements has bit `i` set if type `i` is supported).
pub fn find_type_in(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    filter: PropertyFilter,
) -> Option<u32> {
    // Only the first `memory_type_count` entries of the array
    // are filled in by the driver.
    let count = properties.memory_type_count as usize;

    properties.memory_types
        .iter()
        .take(count)
        .enumerate()
        .find(|&(index, memory_type)| {
            type_bits & (1 << index) != 0 && filter.matches(memory_type.property_flags)
        })
        .map(|(index, _)| index as u32)
}

/// Walks a fallback chain and returns the memory type matched
/// by the first filter that matches anything.
pub fn resolve(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    chain: &[PropertyFilter],
) -> Option<u32> {
    chain
        .iter()
        .find_map(|filter| find_type_in(properties, type_bits, *filter))
}

/// Memory type indices selected for each [`MemoryUsage`] on a
/// given physical device.
#[derive(Debug, Clone, Copy)]
pub struct MemoryTypes {
    properties: vk::PhysicalDeviceMemoryProperties,
    device: Option<u32>,
    staging: Option<u32>,
    bar: Option<u32>,
}

impl MemoryTypes {
    pub fn new(properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        info!("Memory types:");
        for (index, memory_type) in properties.memory_types
            .iter()
            .take(properties.memory_type_count as usize)
            .enumerate()
        {
            info!(
                "  Type {}: {:?} (heap {})",
                index, memory_type.property_flags, memory_type.heap_index,
            );
        }

        let device = resolve(&properties, u32::MAX, &DEVICE_CHAIN);
        let staging = resolve(&properties, u32::MAX, &STAGING_CHAIN);
        let bar = resolve(&properties, u32::MAX, &BAR_CHAIN);
        debug!("Resolved memory types: device {device:?}, staging {staging:?}, bar {bar:?}.");

        Self {
            properties,
            device,
            staging,
            bar,
        }
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.properties
    }

    pub fn device(&self) -> Result<u32, MemoryTypeError> {
        self.device.ok_or(MemoryTypeError::NotFound(MemoryUsage::Device))
    }

    pub fn staging(&self) -> Result<u32, MemoryTypeError> {
        self.staging.ok_or(MemoryTypeError::NotFound(MemoryUsage::Staging))
    }

    pub fn bar(&self) -> Result<u32, MemoryTypeError> {
        self.bar.ok_or(MemoryTypeError::NotFound(MemoryUsage::Bar))
    }

    pub fn get(&self, usage: MemoryUsage) -> Result<u32, MemoryTypeError> {
        match usage {
            MemoryUsage::Device => self.device(),
            MemoryUsage::Staging => self.staging(),
            MemoryUsage::Bar => self.bar(),
        }
    }

    /// Memory to upload through: BAR memory when it is enabled
    /// in the configuration, regular staging memory otherwise.
    pub fn staging_fast(&self, config: &Config) -> Result<u32, MemoryTypeError> {
        if config.use_bar_memory {
            self.bar()
        } else {
            self.staging()
        }
    }

    /// Resolves the chain of `usage` again, restricted to the
    /// memory types allowed by a set of resources.
    pub fn for_type_bits(&self, usage: MemoryUsage, type_bits: u32) -> Result<u32, MemoryTypeError> {
        let chain: &[PropertyFilter] = match usage {
            MemoryUsage::Device => DEVICE_CHAIN.as_slice(),
            MemoryUsage::Staging => STAGING_CHAIN.as_slice(),
            MemoryUsage::Bar => BAR_CHAIN.as_slice(),
        };
        resolve(&self.properties, type_bits, chain).ok_or(MemoryTypeError::NotFound(usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds memory properties with one type per entry of
    /// `flags`, all on heap 0.
    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = flags.len() as u32;
        properties.memory_heap_count = 1;
        for (index, &property_flags) in flags.iter().enumerate() {
            properties.memory_types[index] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        properties
    }

    const LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;
    const CACHED: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_CACHED;

    /// Memory layout of a typical discrete GPU with resizable
    /// BAR.
    fn discrete() -> vk::PhysicalDeviceMemoryProperties {
        properties(&[
            LOCAL,
            VISIBLE | COHERENT,
            VISIBLE | COHERENT | CACHED,
            LOCAL | VISIBLE | COHERENT,
        ])
    }

    /// Memory layout of an integrated GPU, where every type is
    /// device-local.
    fn integrated() -> vk::PhysicalDeviceMemoryProperties {
        properties(&[
            LOCAL,
            LOCAL | VISIBLE | COHERENT,
            LOCAL | VISIBLE | COHERENT | CACHED,
        ])
    }

    #[test]
    fn test_filter_matches() {
        let filter = PropertyFilter::new(VISIBLE | COHERENT, LOCAL);

        assert!(filter.matches(VISIBLE | COHERENT));
        assert!(filter.matches(VISIBLE | COHERENT | CACHED));
        assert!(!filter.matches(VISIBLE));
        assert!(!filter.matches(LOCAL | VISIBLE | COHERENT));
    }

    #[test]
    fn test_find_type_first_match() {
        let props = discrete();
        let filter = PropertyFilter::new(VISIBLE, vk::MemoryPropertyFlags::empty());

        assert_eq!(find_type(&props, filter), Some(1));
    }

    #[test]
    fn test_find_type_respects_type_bits() {
        let props = discrete();
        let filter = PropertyFilter::new(VISIBLE, vk::MemoryPropertyFlags::empty());

        assert_eq!(find_type_in(&props, 0b1100, filter), Some(2));
        assert_eq!(find_type_in(&props, 0b0001, filter), None);
    }

    #[test]
    fn test_find_type_ignores_unused_entries() {
        let mut props = properties(&[LOCAL]);
        // Garbage past the advertised count must not be
        // considered.
        props.memory_types[1].property_flags = VISIBLE | COHERENT;
        let filter = PropertyFilter::new(VISIBLE, vk::MemoryPropertyFlags::empty());

        assert_eq!(find_type(&props, filter), None);
    }

    #[test]
    fn test_resolve_chain_order() {
        let props = discrete();

        assert_eq!(resolve(&props, u32::MAX, &DEVICE_CHAIN), Some(0));
        assert_eq!(resolve(&props, u32::MAX, &STAGING_CHAIN), Some(1));
        assert_eq!(resolve(&props, u32::MAX, &BAR_CHAIN), Some(3));
    }

    #[test]
    fn test_resolve_integrated_fallbacks() {
        let types = MemoryTypes::new(integrated());

        assert_eq!(types.device(), Ok(0));
        // No pure host memory: staging falls back to
        // host-visible device memory.
        assert_eq!(types.staging(), Ok(1));
        assert_eq!(types.bar(), Ok(1));
    }

    #[test]
    fn test_device_prefers_pure_device_local() {
        // The host-visible type comes first, but the purely
        // device-local one is chosen.
        let types = MemoryTypes::new(properties(&[
            LOCAL | VISIBLE | COHERENT,
            LOCAL,
        ]));

        assert_eq!(types.device(), Ok(1));
        assert_eq!(resolve(types.properties(), u32::MAX, &DEVICE_CHAIN[1..]), Some(0));
    }

    #[test]
    fn test_device_falls_back_to_uncached() {
        let types = MemoryTypes::new(properties(&[
            LOCAL | VISIBLE | COHERENT | CACHED,
            LOCAL | VISIBLE | COHERENT,
        ]));

        assert_eq!(types.device(), Ok(1));
    }

    #[test]
    fn test_missing_types() {
        let types = MemoryTypes::new(properties(&[VISIBLE | COHERENT]));

        assert_eq!(types.device(), Err(MemoryTypeError::NotFound(MemoryUsage::Device)));
        assert_eq!(types.staging(), Ok(0));
        assert_eq!(types.bar(), Err(MemoryTypeError::NotFound(MemoryUsage::Bar)));
        assert_eq!(
            types.get(MemoryUsage::Bar).unwrap_err().to_string(),
            "No suitable memory type for bar memory."
        );
    }

    #[test]
    fn test_staging_fast_follows_config() {
        let types = MemoryTypes::new(discrete());

        let config = Config { use_bar_memory: false };
        assert_eq!(types.staging_fast(&config), Ok(1));

        let config = Config { use_bar_memory: true };
        assert_eq!(types.staging_fast(&config), Ok(3));
    }

    #[test]
    fn test_for_type_bits() {
        let types = MemoryTypes::new(discrete());

        // Resources that cannot live in type 1 end up in the
        // cached host type.
        assert_eq!(types.for_type_bits(MemoryUsage::Staging, 0b1100), Ok(2));
        assert_eq!(
            types.for_type_bits(MemoryUsage::Device, 0b0110),
            Err(MemoryTypeError::NotFound(MemoryUsage::Device))
        );
    }
}
