//! Linear suballocation of Vulkan (or host) memory.
//!
//! A [`Suballocator`] hands out aligned offsets inside a single
//! memory region by bumping a cursor; it never frees. On top of
//! it, a [`LayoutPlan`] places a whole batch of resources before
//! their memory exists, so they can share one allocation, and
//! [`MemoryTypes`] picks the memory type to allocate from.
//!
//! [`Suballocator`]: crate::core::allocator::Suballocator
//! [`LayoutPlan`]: crate::core::allocator::LayoutPlan
//! [`MemoryTypes`]: crate::core::allocator::MemoryTypes

pub mod config;
pub mod core;
