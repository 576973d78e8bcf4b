use std::cell::UnsafeCell;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};

const BLOCK_SIZE: usize = 4096;

// Bump allocator backing one memtable. Blocks are only released when the
// arena itself is dropped, so every pointer handed out stays valid for
// the arena's whole lifetime.
//
// Allocation is reserved to the single writer (see `allocate`); readers
// only ever dereference previously handed-out pointers and may query
// `memory_usage` at any time.
pub struct Arena {
    core: UnsafeCell<ArenaCore>,
    usage: AtomicUsize,
}

struct ArenaCore {
    alloc_ptr: *mut u8,
    remaining: usize,
    // u64 backing keeps every block start pointer-aligned
    blocks: Vec<Box<[u64]>>,
}

unsafe impl Send for Arena {}
// Safety: the interior mutability in `core` is only exercised by the
// allocating thread; the external single-writer contract on `allocate`
// and `allocate_aligned` rules out concurrent mutation. `usage` is
// atomic.
unsafe impl Sync for Arena {}

impl Arena {
    pub fn new() -> Self {
        Arena {
            core: UnsafeCell::new(ArenaCore {
                alloc_ptr: std::ptr::null_mut(),
                remaining: 0,
                blocks: Vec::new(),
            }),
            usage: AtomicUsize::new(0),
        }
    }

    /// Hand out `n` contiguous bytes with no alignment guarantee beyond
    /// byte access. `n` must be positive.
    ///
    /// # Safety
    ///
    /// At most one thread may be allocating at any moment. Callers
    /// serialize writes externally, exactly as they do for inserts into
    /// the structures built on top of this arena.
    pub unsafe fn allocate(&self, n: usize) -> *mut u8 {
        debug_assert!(n > 0);
        let core = &mut *self.core.get();
        if n <= core.remaining {
            let p = core.alloc_ptr;
            core.alloc_ptr = p.add(n);
            core.remaining -= n;
            return p;
        }
        self.allocate_fallback(core, n)
    }

    /// Like `allocate`, but the returned pointer is aligned for atomic
    /// pointer storage.
    ///
    /// # Safety
    ///
    /// Same single-writer contract as `allocate`.
    pub unsafe fn allocate_aligned(&self, n: usize) -> *mut u8 {
        debug_assert!(n > 0);
        let align = mem::size_of::<usize>();
        let core = &mut *self.core.get();
        let slop = match core.alloc_ptr as usize & (align - 1) {
            0 => 0,
            r => align - r,
        };
        if n + slop <= core.remaining {
            let p = core.alloc_ptr.add(slop);
            core.alloc_ptr = p.add(n);
            core.remaining -= n + slop;
            return p;
        }
        // fresh blocks start on a word boundary already
        self.allocate_fallback(core, n)
    }

    unsafe fn allocate_fallback(&self, core: &mut ArenaCore, n: usize) -> *mut u8 {
        if n > BLOCK_SIZE / 4 {
            // big requests get a block of their own, so the bump cursor
            // never strands more than a quarter block
            return self.new_block(core, n);
        }
        let p = self.new_block(core, BLOCK_SIZE);
        core.alloc_ptr = p.add(n);
        core.remaining = BLOCK_SIZE - n;
        p
    }

    unsafe fn new_block(&self, core: &mut ArenaCore, bytes: usize) -> *mut u8 {
        let words = (bytes + 7) / 8;
        let mut block = vec![0u64; words].into_boxed_slice();
        let p = block.as_mut_ptr() as *mut u8;
        core.blocks.push(block);
        self.usage
            .fetch_add(words * 8 + mem::size_of::<Box<[u64]>>(), Ordering::Relaxed);
        p
    }

    // Upper-bound estimate of the memory held by the arena, including
    // block bookkeeping. May lag a racing allocation but never decreases.
    pub fn memory_usage(&self) -> usize {
        self.usage.load(Ordering::Relaxed)
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
