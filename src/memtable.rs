use crate::compare::Comparator;
use crate::key::{InternalKeyComparator, InternalKeyKind, InternalKeyRef, LookupKey};
use crate::memtable::arena::Arena;
use crate::memtable::skiplist::{KeyComparator, SkipList, SkipListIterator};
use crate::opts::Opts;
use crate::utils::varint::{uvarint_len, write_uvarint};
use bytes::Bytes;
use std::cmp::Ordering;
use std::slice;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicU64, AtomicUsize};
use std::sync::Arc;

pub mod arena;
pub mod skiplist;

// A memtable handle is a reference count: clones keep the table (and with
// it the arena holding every record) alive, dropping the last one frees
// the lot.
pub type MemTable = Arc<MemTableRaw>;

pub fn new_memtable(opts: Opts) -> MemTable {
    Arc::new(MemTableRaw::new(opts))
}

// Multi-version ordered write buffer. Each write becomes one immutable
// record in the arena:
//
//   varint32(ukey_len + 8) || ukey || tag (fixed64 LE) || varint32(value_len) || value
//
// with tag = (seq_num << 8) | kind. The skiplist holds raw pointers to
// these records and orders them by decoding the leading length-prefixed
// internal key, so the newest version of a user key always comes first.
pub struct MemTableRaw {
    opts: Opts,
    icmp: InternalKeyComparator,
    arena: Arc<Arena>,
    list: SkipList<*const u8, RecordComparator>,
    entries: AtomicUsize,
    last_seq: AtomicU64,
}

impl MemTableRaw {
    pub fn new(opts: Opts) -> Self {
        let icmp = opts.get_icmp();
        let arena = Arc::new(Arena::new());
        let list = SkipList::new(RecordComparator { icmp }, arena.clone());
        MemTableRaw {
            opts,
            icmp,
            arena,
            list,
            entries: AtomicUsize::new(0),
            last_seq: AtomicU64::new(0),
        }
    }

    /// Append one version of `key`. Callers serialize writes (one writer
    /// at a time) and hand out strictly increasing sequence numbers,
    /// which keeps every encoded internal key unique. Readers may run
    /// concurrently.
    pub fn add(&self, seq_num: u64, kind: InternalKeyKind, key: &[u8], value: &[u8]) {
        debug_assert!(seq_num >> 56 == 0, "sequence number overflows the tag");
        let internal_key_size = key.len() + 8;
        let encoded_len = uvarint_len(internal_key_size as u64)
            + internal_key_size
            + uvarint_len(value.len() as u64)
            + value.len();
        unsafe {
            let p = self.arena.allocate(encoded_len);
            let buf = slice::from_raw_parts_mut(p, encoded_len);
            let mut off = write_uvarint(buf, internal_key_size as u64);
            buf[off..off + key.len()].copy_from_slice(key);
            off += key.len();
            let tag = (seq_num << 8) | kind as u64;
            buf[off..off + 8].copy_from_slice(&tag.to_le_bytes());
            off += 8;
            off += write_uvarint(&mut buf[off..], value.len() as u64);
            buf[off..off + value.len()].copy_from_slice(value);
            debug_assert_eq!(off + value.len(), encoded_len);
            self.list.insert(p as *const u8);
        }
        self.entries.fetch_add(1, Relaxed);
        if seq_num > self.last_seq.load(Relaxed) {
            self.last_seq.store(seq_num, Relaxed);
        }
    }

    pub fn set(&self, key: &[u8], seq_num: u64, value: &[u8]) {
        self.add(seq_num, InternalKeyKind::Set, key, value);
    }

    pub fn del(&self, key: &[u8], seq_num: u64) {
        self.add(seq_num, InternalKeyKind::Delete, key, b"");
    }

    // Point lookup against the newest version of the user key at or below
    // the lookup sequence. None: this table knows nothing about the key.
    // Some(None): the newest version is a deletion. Some(Some(v)): the
    // newest version carries value v.
    pub fn get(&self, key: &LookupKey) -> Option<Option<Bytes>> {
        let mut iter = SkipListIterator::new(&self.list);
        let target = key.memtable_key().as_ptr();
        iter.seek(&target);
        if !iter.valid() {
            return None;
        }
        // the seek landed on the newest version of the first user key at
        // or after ours; older versions never need a look
        let ikey = unsafe { length_prefixed_slice(*iter.key()) };
        let ucmp = self.icmp.user_comparator();
        if ucmp.compare(&ikey[..ikey.len() - 8], key.user_key()) != Ordering::Equal {
            return None;
        }
        let tag = u64::from_le_bytes(ikey[ikey.len() - 8..].to_vec().try_into().unwrap());
        match tag & ((1 << 8) - 1) {
            x if x == InternalKeyKind::Set as u64 => {
                let value = unsafe { length_prefixed_slice(ikey.as_ptr().add(ikey.len())) };
                Some(Some(Bytes::copy_from_slice(value)))
            }
            x if x == InternalKeyKind::Delete as u64 => Some(None),
            _ => {
                debug_assert!(false, "unknown kind in record tag");
                None
            }
        }
    }

    pub fn iter(&self) -> MemTableIter<'_> {
        MemTableIter {
            iter: SkipListIterator::new(&self.list),
        }
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.arena.memory_usage()
    }

    // flush trigger: the table has outgrown its configured write buffer
    pub fn is_full(&self) -> bool {
        self.approximate_memory_usage() as u64 >= self.opts.get_write_buffer_size()
    }

    pub fn len(&self) -> usize {
        self.entries.load(Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // largest sequence number written so far; replay resumes above it
    pub fn last_seq_num(&self) -> u64 {
        self.last_seq.load(Relaxed)
    }
}

// Skiplist keys are raw pointers to encoded records; ordering means
// recovering the length-prefixed internal key behind each pointer first.
#[derive(Copy, Clone)]
pub(crate) struct RecordComparator {
    icmp: InternalKeyComparator,
}

impl KeyComparator<*const u8> for RecordComparator {
    fn compare(&self, a: &*const u8, b: &*const u8) -> Ordering {
        let (ka, kb) = unsafe { (length_prefixed_slice(*a), length_prefixed_slice(*b)) };
        self.icmp.compare(ka, kb)
    }
}

// Decode a base-128 length prefix in place and return the bytes behind
// it. Only the prefix's own bytes are ever read, so this stays inside
// the record allocation.
unsafe fn length_prefixed_slice<'a>(mut p: *const u8) -> &'a [u8] {
    let (mut len, mut shift) = (0u64, 0u32);
    loop {
        let c = *p;
        p = p.add(1);
        if c < 0x80 {
            len |= (c as u64) << shift;
            break;
        }
        len |= ((c & 0x7f) as u64) << shift;
        shift += 7;
        if shift > 28 {
            panic!("corrupted length prefix in memtable record");
        }
    }
    slice::from_raw_parts(p, len as usize)
}

// Cursor over every record version in internal-key order. Keys and
// values are decoded straight off the arena; the borrow keeps the table
// alive underneath them.
pub struct MemTableIter<'a> {
    iter: SkipListIterator<'a, *const u8, RecordComparator>,
}

impl<'a> MemTableIter<'a> {
    pub fn valid(&self) -> bool {
        self.iter.valid()
    }

    pub fn seek(&mut self, key: &LookupKey) {
        let target = key.memtable_key().as_ptr();
        self.iter.seek(&target);
    }

    pub fn seek_to_first(&mut self) {
        self.iter.seek_to_first();
    }

    pub fn seek_to_last(&mut self) {
        self.iter.seek_to_last();
    }

    pub fn next(&mut self) {
        self.iter.next();
    }

    pub fn prev(&mut self) {
        self.iter.prev();
    }

    // the current entry's internal key
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        unsafe { length_prefixed_slice(*self.iter.key()) }
    }

    pub fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        let ikey = self.key();
        unsafe { length_prefixed_slice(ikey.as_ptr().add(ikey.len())) }
    }

    // decoded view of the current entry's internal key
    pub fn ikey(&self) -> InternalKeyRef<'_> {
        InternalKeyRef::from(self.key())
    }
}
