use std::env;

use anyhow::{anyhow, bail, Context, Result};
use log::*;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    prelude::v1_0::*,
};

use linear_suballoc::{
    config::Config,
    core::allocator::{LayoutPlan, MemoryTypes, MemoryUsage, MIN_ALIGNMENT},
};

const USAGE: &str = "usage: linear-suballoc [--probe] size[:alignment]...";

fn main() -> Result<()> {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let mut probe = false;
    let mut requests = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--probe" => probe = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => requests.push(parse_request(&arg)?),
        }
    }

    if requests.is_empty() && !probe {
        bail!("{USAGE}");
    }

    if !requests.is_empty() {
        let plan = build_plan(&requests)?;
        print_plan(&requests, &plan);
    }

    if probe {
        // The plan is useful on its own, so a machine without a
        // working Vulkan driver only gets a warning.
        match unsafe { probe_memory_types() } {
            Ok(types) => report_memory_types(&types, &Config::from_env()),
            Err(error) => warn!("Could not probe Vulkan memory types: {error:#}"),
        }
    }

    Ok(())
}

/// Parses a `size[:alignment]` argument. Both numbers may be
/// decimal or `0x`-prefixed hexadecimal; a missing alignment
/// means the minimum one.
fn parse_request(arg: &str) -> Result<(u64, u64)> {
    let (size, alignment) = match arg.split_once(':') {
        Some((size, alignment)) => (size, Some(alignment)),
        None => (arg, None),
    };

    let size = parse_number(size).with_context(|| format!("Invalid size in {arg:?}."))?;
    let alignment = match alignment {
        Some(alignment) => {
            let alignment = parse_number(alignment)
                .with_context(|| format!("Invalid alignment in {arg:?}."))?;
            // Zero is fine: it falls back to the minimum.
            if alignment != 0 && !alignment.is_power_of_two() {
                bail!("Alignment {alignment} in {arg:?} is not a power of two.");
            }
            alignment
        }
        None => 0,
    };

    Ok((size, alignment))
}

fn parse_number(text: &str) -> Result<u64> {
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)?,
        None => text.parse()?,
    };
    Ok(value)
}

/// Places every request in a new plan. The plan itself does not
/// guard against overflow, so each request is checked against
/// the 64-bit range before it is pushed.
fn build_plan(requests: &[(u64, u64)]) -> Result<LayoutPlan> {
    let mut plan = LayoutPlan::new();
    for (index, &(size, alignment)) in requests.iter().enumerate() {
        let mask = alignment.max(MIN_ALIGNMENT) - 1;
        let end = plan
            .allocation_size()
            .checked_add(mask)
            .map(|start| start & !mask)
            .and_then(|start| start.checked_add(size));
        if end.is_none() {
            bail!("Request {index} ({size} bytes, alignment {alignment}) does not fit in 64 bits.");
        }

        plan.push(vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: u32::MAX,
        });
    }

    Ok(plan)
}

fn print_plan(requests: &[(u64, u64)], plan: &LayoutPlan) {
    println!("{:>5}  {:>12}  {:>12}  {:>9}", "index", "offset", "size", "alignment");
    for (index, (&(size, alignment), &offset)) in requests.iter().zip(plan.offsets()).enumerate() {
        println!("{index:>5}  {offset:>#12x}  {size:>12}  {alignment:>9}");
    }
    println!("total allocation size: {} bytes", plan.allocation_size());
}

unsafe fn probe_memory_types() -> Result<MemoryTypes> {
    let loader = LibloadingLoader::new(LIBRARY)?;
    let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"linear-suballoc\0")
        .application_version(vk::make_version(1, 0, 0))
        .api_version(vk::make_version(1, 1, 0));

    let info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info);

    let instance = entry.create_instance(&info, None)?;
    info!("Created instance.");

    // The first device is good enough to show what the memory
    // type selection does.
    let physical_device = instance
        .enumerate_physical_devices()
        .map(|devices| devices.first().copied());

    let types = match physical_device {
        Ok(Some(physical_device)) => {
            let properties = instance.get_physical_device_memory_properties(physical_device);
            Ok(MemoryTypes::new(properties))
        }
        Ok(None) => Err(anyhow!("No Vulkan physical device found.")),
        Err(error) => Err(error.into()),
    };

    instance.destroy_instance(None);
    types
}

fn report_memory_types(types: &MemoryTypes, config: &Config) {
    for usage in [MemoryUsage::Device, MemoryUsage::Staging, MemoryUsage::Bar] {
        match types.get(usage) {
            Ok(index) => info!("{usage} memory: type {index}"),
            Err(error) => warn!("{error}"),
        }
    }

    match types.staging_fast(config) {
        Ok(index) => info!(
            "Uploads go through type {index} (BAR memory {}).",
            if config.use_bar_memory { "enabled" } else { "disabled" },
        ),
        Err(error) => warn!("{error}"),
    }
}
