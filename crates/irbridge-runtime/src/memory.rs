//! Guest memory: one flat byte array addressed by `u64` guest pointers.
//!
//! Layout, low to high:
//!
//! ```text
//! [0, NULL_GUARD)          never accessible: null dereferences trap
//! [NULL_GUARD, stack_base) globals image, laid out at translation time
//! [stack_base, stack_end)  alloca stack, grows upward, released per frame
//! [stack_end, len)         bump heap for malloc/calloc
//! ```
//!
//! Typed loads and stores are little-endian and unaligned. The generic
//! `read`/`write` wrappers delegate to non-generic inner functions so only
//! one copy of the bounds-checking logic exists (outline pattern).

use crate::{Trap, TrapResult};

/// Addresses below this value are the null guard.
pub const NULL_GUARD: u64 = 64;

/// Sizes of the stack and heap regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub stack_size: u64,
    pub heap_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            stack_size: 256 * 1024,
            heap_size: 1024 * 1024,
        }
    }
}

/// Saved stack pointer, restored by [`Memory::leave_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Frame(u64);

pub struct Memory {
    bytes: Vec<u8>,
    stack_base: u64,
    stack_end: u64,
    sp: u64,
    heap_next: u64,
    /// Start of the most recent heap allocation, for LIFO `free`.
    heap_last: Option<u64>,
}

fn align_up(value: u64, align: u64) -> Option<u64> {
    let align = align.max(1);
    let rem = value % align;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(align - rem)
    }
}

impl Memory {
    /// Memory with an empty globals region and default sizes.
    pub fn new() -> Self {
        Self::with_globals(&[])
    }

    /// Memory whose globals region starts at [`NULL_GUARD`] with `image`.
    pub fn with_globals(image: &[u8]) -> Self {
        Self::with_config(image, MemoryConfig::default())
    }

    pub fn with_config(image: &[u8], config: MemoryConfig) -> Self {
        let globals_end = NULL_GUARD + image.len() as u64;
        let stack_base = align_up(globals_end, 16).unwrap_or(globals_end);
        let stack_end = stack_base.saturating_add(config.stack_size);
        let total = stack_end.saturating_add(config.heap_size);
        let mut bytes = vec![0u8; total as usize];
        bytes[NULL_GUARD as usize..globals_end as usize].copy_from_slice(image);
        Self {
            bytes,
            stack_base,
            stack_end,
            sp: stack_base,
            heap_next: stack_end,
            heap_last: None,
        }
    }

    /// Total size in bytes, guard included.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn stack_pointer(&self) -> u64 {
        self.sp
    }

    // ── Stack ─────────────────────────────────────────────────────────

    pub fn enter_frame(&self) -> Frame {
        Frame(self.sp)
    }

    /// Release every allocation made since `frame` was entered.
    pub fn leave_frame(&mut self, frame: Frame) {
        self.sp = frame.0.clamp(self.stack_base, self.stack_end);
    }

    /// Reserve `size` zeroed bytes on the stack, aligned to `align`.
    pub fn alloca(&mut self, size: u64, align: u64) -> TrapResult<u64> {
        let addr = align_up(self.sp, align).ok_or(Trap::StackOverflow)?;
        let end = addr.checked_add(size).ok_or(Trap::StackOverflow)?;
        if end > self.stack_end {
            return Err(Trap::StackOverflow);
        }
        self.bytes[addr as usize..end as usize].fill(0);
        self.sp = end;
        Ok(addr)
    }

    // ── Heap ──────────────────────────────────────────────────────────

    /// Bump allocation. Returns 0 (null) when the heap is exhausted.
    pub fn malloc(&mut self, size: u64) -> u64 {
        let Some(addr) = align_up(self.heap_next, 16) else {
            return 0;
        };
        match addr.checked_add(size.max(1)) {
            Some(end) if end <= self.size() => {
                self.heap_next = end;
                self.heap_last = Some(addr);
                addr
            }
            _ => 0,
        }
    }

    pub fn calloc(&mut self, count: u64, size: u64) -> u64 {
        let Some(total) = count.checked_mul(size) else {
            return 0;
        };
        let addr = self.malloc(total);
        if addr != 0 {
            self.bytes[addr as usize..(addr + total) as usize].fill(0);
        }
        addr
    }

    /// Only the most recent allocation is actually reclaimed.
    pub fn free(&mut self, addr: u64) {
        if addr != 0 && self.heap_last == Some(addr) {
            self.heap_next = addr;
            self.heap_last = None;
        }
    }

    // ── Bulk operations ───────────────────────────────────────────────

    /// `memmove` semantics: overlapping regions are handled.
    pub fn copy(&mut self, dst: u64, src: u64, len: u64) -> TrapResult<()> {
        if len == 0 {
            return Ok(());
        }
        let src_range = checked_range(self.bytes.len(), src, len)?;
        let dst_range = checked_range(self.bytes.len(), dst, len)?;
        self.bytes.copy_within(src_range, dst_range.start);
        Ok(())
    }

    pub fn fill(&mut self, dst: u64, byte: u8, len: u64) -> TrapResult<()> {
        if len == 0 {
            return Ok(());
        }
        let range = checked_range(self.bytes.len(), dst, len)?;
        self.bytes[range].fill(byte);
        Ok(())
    }

    pub fn read_bytes(&self, addr: u64, len: u64) -> TrapResult<&[u8]> {
        let range = checked_range(self.bytes.len(), addr, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) -> TrapResult<()> {
        let range = checked_range(self.bytes.len(), addr, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Bytes of the NUL-terminated string at `addr`, terminator excluded.
    pub fn read_c_string(&self, addr: u64) -> TrapResult<&[u8]> {
        let start = checked_range(self.bytes.len(), addr, 1)?.start;
        let len = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(Trap::OutOfBounds)?;
        Ok(&self.bytes[start..start + len])
    }

    // ── Typed access ──────────────────────────────────────────────────

    #[inline(always)]
    fn read<const N: usize>(&self, addr: u64) -> TrapResult<[u8; N]> {
        let s = load_inner(&self.bytes, addr, N as u64)?;
        s.try_into().map_err(|_| Trap::OutOfBounds)
    }

    #[inline(always)]
    fn write<const N: usize>(&mut self, addr: u64, value: [u8; N]) -> TrapResult<()> {
        store_inner(&mut self.bytes, addr, &value)
    }

    pub fn load_bool(&self, addr: u64) -> TrapResult<bool> {
        Ok(self.read::<1>(addr)?[0] & 1 != 0)
    }

    pub fn store_bool(&mut self, addr: u64, value: bool) -> TrapResult<()> {
        self.write(addr, [value as u8])
    }

    pub fn load_i8(&self, addr: u64) -> TrapResult<i8> {
        Ok(i8::from_le_bytes(self.read(addr)?))
    }

    pub fn store_i8(&mut self, addr: u64, value: i8) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_i16(&self, addr: u64) -> TrapResult<i16> {
        Ok(i16::from_le_bytes(self.read(addr)?))
    }

    pub fn store_i16(&mut self, addr: u64, value: i16) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_i32(&self, addr: u64) -> TrapResult<i32> {
        Ok(i32::from_le_bytes(self.read(addr)?))
    }

    pub fn store_i32(&mut self, addr: u64, value: i32) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_i64(&self, addr: u64) -> TrapResult<i64> {
        Ok(i64::from_le_bytes(self.read(addr)?))
    }

    pub fn store_i64(&mut self, addr: u64, value: i64) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_i128(&self, addr: u64) -> TrapResult<i128> {
        Ok(i128::from_le_bytes(self.read(addr)?))
    }

    pub fn store_i128(&mut self, addr: u64, value: i128) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_f32(&self, addr: u64) -> TrapResult<f32> {
        Ok(f32::from_le_bytes(self.read(addr)?))
    }

    pub fn store_f32(&mut self, addr: u64, value: f32) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_f64(&self, addr: u64) -> TrapResult<f64> {
        Ok(f64::from_le_bytes(self.read(addr)?))
    }

    pub fn store_f64(&mut self, addr: u64, value: f64) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }

    pub fn load_ptr(&self, addr: u64) -> TrapResult<u64> {
        Ok(u64::from_le_bytes(self.read(addr)?))
    }

    pub fn store_ptr(&mut self, addr: u64, value: u64) -> TrapResult<()> {
        self.write(addr, value.to_le_bytes())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

// ── Non-generic inner functions ───────────────────────────────────────
//
// No unwrap(), no unchecked indexing, no panic paths.

/// Validate `[addr, addr + len)` against the guard and the array length.
#[inline(never)]
fn checked_range(mem_len: usize, addr: u64, len: u64) -> TrapResult<std::ops::Range<usize>> {
    if addr < NULL_GUARD {
        return Err(Trap::NullDereference);
    }
    let end = addr.checked_add(len).ok_or(Trap::OutOfBounds)?;
    if end > mem_len as u64 {
        return Err(Trap::OutOfBounds);
    }
    Ok(addr as usize..end as usize)
}

#[inline(never)]
fn load_inner(memory: &[u8], addr: u64, len: u64) -> TrapResult<&[u8]> {
    let range = checked_range(memory.len(), addr, len)?;
    memory.get(range).ok_or(Trap::OutOfBounds)
}

#[inline(never)]
fn store_inner(memory: &mut [u8], addr: u64, data: &[u8]) -> TrapResult<()> {
    let range = checked_range(memory.len(), addr, data.len() as u64)?;
    let dst = memory.get_mut(range).ok_or(Trap::OutOfBounds)?;
    dst.copy_from_slice(data);
    Ok(())
}


// ── Kani proofs ───────────────────────────────────────────────────────
//
// Run with: cargo kani -p irbridge-runtime
//
// Every typed access either succeeds inside [NULL_GUARD, size) or returns
// a trap; no address panics.

#[cfg(kani)]
mod proofs {
    use super::*;

    fn tiny() -> Memory {
        Memory::with_config(
            &[],
            MemoryConfig {
                stack_size: 16,
                heap_size: 16,
            },
        )
    }

    #[kani::proof]
    #[kani::unwind(1)]
    fn load_i32_never_panics() {
        let mem = tiny();
        let addr: u64 = kani::any();
        if mem.load_i32(addr).is_ok() {
            kani::assert(addr >= NULL_GUARD, "successful load is above the guard");
            kani::assert(addr + 4 <= mem.size(), "successful load is in bounds");
        }
    }

    #[kani::proof]
    #[kani::unwind(1)]
    fn store_i64_never_panics() {
        let mut mem = tiny();
        let addr: u64 = kani::any();
        let value: i64 = kani::any();
        if mem.store_i64(addr, value).is_ok() {
            kani::assert(mem.load_i64(addr) == Ok(value), "store/load round trip");
        }
    }

    #[kani::proof]
    #[kani::unwind(2)]
    fn alloca_stays_inside_stack() {
        let mut mem = tiny();
        let size: u64 = kani::any();
        let align: u64 = kani::any();
        kani::assume(align <= 16);
        if let Ok(addr) = mem.alloca(size, align) {
            kani::assert(addr >= mem.stack_base, "alloca above stack base");
            kani::assert(mem.stack_pointer() <= mem.stack_end, "sp within stack");
        }
    }
}
