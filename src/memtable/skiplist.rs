use crate::memtable::arena::Arena;
use crate::utils::random::Random;
use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::mem;
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::Arc;

pub(crate) const MAX_HEIGHT: usize = 12;
const BRANCHING: u32 = 4;

pub trait KeyComparator<K> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

// One tower slot lives inline; slots 1..height sit in the over-allocated
// tail right behind it. All tower access therefore goes through raw
// pointers derived from the node pointer, never through a &Node borrow.
#[repr(C)]
struct Node<K> {
    key: K,
    next: [AtomicPtr<Node<K>>; 1],
}

impl<K> Node<K> {
    unsafe fn tower<'a>(node: *mut Node<K>, level: usize) -> &'a AtomicPtr<Node<K>> {
        &*(ptr::addr_of_mut!((*node).next) as *mut AtomicPtr<Node<K>>).add(level)
    }

    unsafe fn key<'a>(node: *mut Node<K>) -> &'a K {
        &(*node).key
    }

    unsafe fn next(node: *mut Node<K>, level: usize) -> *mut Node<K> {
        // acquire pairs with the release in set_next: anything we reach
        // through this pointer is fully initialized
        Self::tower(node, level).load(Acquire)
    }

    unsafe fn set_next(node: *mut Node<K>, level: usize, x: *mut Node<K>) {
        Self::tower(node, level).store(x, Release)
    }

    unsafe fn nobarrier_next(node: *mut Node<K>, level: usize) -> *mut Node<K> {
        Self::tower(node, level).load(Relaxed)
    }

    unsafe fn nobarrier_set_next(node: *mut Node<K>, level: usize, x: *mut Node<K>) {
        Self::tower(node, level).store(x, Relaxed)
    }
}

// Ordered map over keys of type `K`. Writes are append-only: keys are
// never removed or updated in place, and node memory is owned by the
// arena until the whole list goes away.
//
// Concurrency contract: `insert` is single-writer (callers serialize it
// externally); every read-side operation may run concurrently with that
// writer and with other readers, without locking.
pub struct SkipList<K, C> {
    cmp: C,
    arena: Arc<Arena>,
    head: *mut Node<K>,
    // tallest tower currently in use; only ever grows
    max_height: AtomicUsize,
    // writer-only state, guarded by the single-writer contract
    rnd: UnsafeCell<Random>,
}

// Safety: nodes are reached only through atomic links with the orderings
// set out on Node; the non-atomic fields (rnd, and the arena's bump
// state) are touched by the single writer alone.
unsafe impl<K, C: Send> Send for SkipList<K, C> {}
unsafe impl<K, C: Sync> Sync for SkipList<K, C> {}

impl<K, C: KeyComparator<K>> SkipList<K, C> {
    pub fn new(cmp: C, arena: Arc<Arena>) -> Self {
        let list = SkipList {
            cmp,
            arena,
            head: ptr::null_mut(),
            max_height: AtomicUsize::new(1),
            rnd: UnsafeCell::new(Random::new(0xdeadbeef)),
        };
        let head = list.alloc_node(MAX_HEIGHT);
        // the head key is never read: searches only ever compare keys of
        // successor nodes
        SkipList { head, ..list }
    }

    /// Insert `key`. No equal key may already be present.
    ///
    /// # Safety
    ///
    /// Single writer: callers must serialize `insert` externally.
    /// Concurrent readers are fine.
    pub unsafe fn insert(&self, key: K) {
        let mut prev = [ptr::null_mut(); MAX_HEIGHT];
        let x = self.find_greater_or_equal(&key, Some(&mut prev));
        debug_assert!(
            x.is_null() || self.cmp.compare(Node::key(x), &key) != Ordering::Equal,
            "duplicate key inserted into skiplist"
        );

        let height = self.random_height();
        let max_height = self.max_height();
        if height > max_height {
            for p in prev[max_height..height].iter_mut() {
                *p = self.head;
            }
            // no barrier needed: a racing reader that still sees the old
            // value starts one level lower, one that sees the new value
            // meets either null or a fully published node from head
            self.max_height.store(height, Relaxed);
        }

        let x = self.new_node(key, height);
        for level in 0..height {
            // plain stores suffice until the release below makes the
            // node reachable at this level
            Node::nobarrier_set_next(x, level, Node::nobarrier_next(prev[level], level));
            Node::set_next(prev[level], level, x);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        let x = self.find_greater_or_equal(key, None);
        !x.is_null() && self.cmp.compare(unsafe { Node::key(x) }, key) == Ordering::Equal
    }

    fn max_height(&self) -> usize {
        self.max_height.load(Relaxed)
    }

    fn random_height(&self) -> usize {
        // writer-only state, see the Sync comment above
        let rnd = unsafe { &mut *self.rnd.get() };
        let mut height = 1;
        while height < MAX_HEIGHT && rnd.one_in(BRANCHING) {
            height += 1;
        }
        height
    }

    fn key_is_after_node(&self, key: &K, n: *mut Node<K>) -> bool {
        !n.is_null() && self.cmp.compare(unsafe { Node::key(n) }, key) == Ordering::Less
    }

    // First node at or after `key`, null if there is none. When `prev` is
    // given it receives, per level, the last node strictly before `key`.
    fn find_greater_or_equal(
        &self,
        key: &K,
        mut prev: Option<&mut [*mut Node<K>; MAX_HEIGHT]>,
    ) -> *mut Node<K> {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if self.key_is_after_node(key, next) {
                x = next;
            } else {
                if let Some(p) = prev.as_mut() {
                    p[level] = x;
                }
                if level == 0 {
                    return next;
                }
                level -= 1;
            }
        }
    }

    // Last node strictly before `key`; the head sentinel if none is.
    fn find_less_than(&self, key: &K) -> *mut Node<K> {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if self.key_is_after_node(key, next) {
                x = next;
            } else {
                if level == 0 {
                    return x;
                }
                level -= 1;
            }
        }
    }

    // Last node of the list; the head sentinel when the list is empty.
    fn find_last(&self) -> *mut Node<K> {
        let mut x = self.head;
        let mut level = self.max_height() - 1;
        loop {
            let next = unsafe { Node::next(x, level) };
            if !next.is_null() {
                x = next;
            } else {
                if level == 0 {
                    return x;
                }
                level -= 1;
            }
        }
    }

    fn new_node(&self, key: K, height: usize) -> *mut Node<K> {
        let p = self.alloc_node(height);
        unsafe {
            ptr::addr_of_mut!((*p).key).write(key);
        }
        p
    }

    fn alloc_node(&self, height: usize) -> *mut Node<K> {
        debug_assert!(height >= 1 && height <= MAX_HEIGHT);
        debug_assert!(mem::align_of::<Node<K>>() <= mem::size_of::<usize>());
        let size =
            mem::size_of::<Node<K>>() + (height - 1) * mem::size_of::<AtomicPtr<Node<K>>>();
        unsafe {
            // allocation happens on the writer path only, same contract
            // as insert
            let p = self.arena.allocate_aligned(size) as *mut Node<K>;
            let tower = ptr::addr_of_mut!((*p).next) as *mut AtomicPtr<Node<K>>;
            for i in 0..height {
                tower.add(i).write(AtomicPtr::new(ptr::null_mut()));
            }
            p
        }
    }
}

// Read cursor over a skiplist. The borrow ties its lifetime to the list;
// a cursor with a null node is invalid.
pub struct SkipListIterator<'a, K, C> {
    list: &'a SkipList<K, C>,
    node: *mut Node<K>,
}

impl<'a, K, C: KeyComparator<K>> SkipListIterator<'a, K, C> {
    pub fn new(list: &'a SkipList<K, C>) -> Self {
        SkipListIterator {
            list,
            node: ptr::null_mut(),
        }
    }

    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    pub fn key(&self) -> &K {
        debug_assert!(self.valid());
        unsafe { Node::key(self.node) }
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        self.node = unsafe { Node::next(self.node, 0) };
    }

    // O(log n): there are no back links, so stepping back is a search
    // from the head.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        let x = self.list.find_less_than(unsafe { Node::key(self.node) });
        self.node = if x == self.list.head {
            ptr::null_mut()
        } else {
            x
        };
    }

    pub fn seek(&mut self, target: &K) {
        self.node = self.list.find_greater_or_equal(target, None);
    }

    pub fn seek_to_first(&mut self) {
        self.node = unsafe { Node::next(self.list.head, 0) };
    }

    pub fn seek_to_last(&mut self) {
        let x = self.list.find_last();
        self.node = if x == self.list.head {
            ptr::null_mut()
        } else {
            x
        };
    }
}
