/// Smallest alignment the suballocator will ever use. Requests
/// with a lower alignment (including 0) are rounded up to it.
pub const MIN_ALIGNMENT: u64 = 8;

/// Linear (bump) suballocator that carves aligned byte ranges
/// out of a single contiguous memory region.
///
/// The allocator never frees: each call to [`allocate`] moves
/// a cursor forward and returns the offset of the new range,
/// relative to the base address of the region. It does not
/// know the size of the region either, so the caller has to
/// make sure the total returned by [`allocated_size`] fits in
/// the backing memory.
///
/// [`allocate`]: Suballocator::allocate
/// [`allocated_size`]: Suballocator::allocated_size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suballocator {
    /// Address (or any numeric origin) of the region. It is
    /// never dereferenced, only used to align the absolute
    /// position of each range.
    base: u64,
    /// Number of bytes consumed so far, padding included.
    allocated: u64,
}

impl Suballocator {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            allocated: 0,
        }
    }

    /// Reserves `size` bytes aligned to `alignment` and returns
    /// their offset from the base address.
    ///
    /// The alignment applies to the absolute address, so with
    /// a misaligned base the returned offset itself is not
    /// necessarily a multiple of `alignment`, but
    /// `base + offset` always is.
    ///
    /// # Preconditions
    ///
    /// - `max(alignment, MIN_ALIGNMENT)` must be a power of
    ///   two. Other values give a meaningless offset; this is
    ///   only checked in debug builds.
    /// - `base + allocated_size() + (alignment - 1) + size` must not
    ///   overflow a `u64`. Debug builds panic on overflow,
    ///   release builds wrap.
    pub fn allocate(&mut self, size: u64, alignment: u64) -> u64 {
        let alignment = alignment.max(MIN_ALIGNMENT);
        debug_assert!(
            alignment.is_power_of_two(),
            "alignment {alignment} is not a power of two"
        );

        // The next free byte, in absolute terms, is right
        // after everything handed out so far. Round it up to
        // the alignment and convert it back to an offset.
        let candidate = self.base + self.allocated;
        let slice_offset = align_up(candidate, alignment) - self.base;

        // Both the padding and the requested size are now
        // consumed; the padding is simply never returned to
        // anyone.
        self.allocated = slice_offset + size;
        slice_offset
    }

    /// Total number of bytes consumed, including the padding
    /// introduced for alignment. This is the size the backing
    /// region needs to have to hold every range handed out.
    pub fn allocated_size(&self) -> u64 {
        self.allocated
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    // Adding `alignment - 1` pushes any value that is not
    // already a multiple past the next boundary, and the mask
    // !(A - 1) then clears the low bits. For A = 0x10:
    //
    //    V + A - 1 = 0001 1001  (V = 0x0A)
    //  & !(A - 1)  = 1111 0000
    //  -----------------------
    //                0001 0000  = 0x10
    //
    // !(A - 1) is the same mask as the two's complement -A.
    (value + (alignment - 1)) & !(alignment - 1)
}
