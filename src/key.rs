use crate::compare::{Comparator, ComparatorImpl};
use crate::key::InternalKeyKind::{Delete, Set};
use crate::utils::varint::put_uvarint;
use crate::Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::cmp::Ordering;

pub const MAX_SEQ_NUM: u64 = (1u64 << 56) - 1;

// An internal key is `user_key || tag` where the trailing 8 bytes pack
// the sequence number and the operation kind: (seq_num << 8) | kind.
#[derive(Copy, Clone, Debug)]
pub struct InternalKeyRef<'a> {
    pub ukey: &'a [u8],
    pub k: InternalKeyKind,
    pub seq_num: u64,
}

impl<'a, 'b: 'a> From<(&'b [u8], u64)> for InternalKeyRef<'a> {
    fn from(value: (&'b [u8], u64)) -> Self {
        InternalKeyRef {
            ukey: value.0[..].as_ref(),
            seq_num: value.1,
            k: Set,
        }
    }
}

impl<'a> From<&'a [u8]> for InternalKeyRef<'a> {
    fn from(value: &'a [u8]) -> Self {
        let l = value.len();
        let tag = u64::from_le_bytes(value[l - 8..].to_vec().try_into().unwrap());
        let kind = tag & ((1 << 8) - 1);
        Self {
            ukey: value[..(l - 8)].as_ref(),
            k: if kind == 0 { Delete } else { Set },
            seq_num: tag >> 8,
        }
    }
}

impl<'a> InternalKeyRef<'a> {
    pub fn to_owned(&self) -> InternalKey {
        let mut ik = BytesMut::from(self.ukey);
        ik.put_u64_le((self.seq_num << 8) | (self.k as u64));
        InternalKey(ik.freeze())
    }
}

#[derive(Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct InternalKey(Bytes);

impl TryFrom<Bytes> for InternalKey {
    type Error = Error;

    fn try_from(value: Bytes) -> Result<Self, Self::Error> {
        if value.len() < 8 {
            return Err(Error::InvalidInternalKey(value.to_vec()));
        }
        let l = value.len();
        let tag = u64::from_le_bytes(value[l - 8..].to_vec().try_into().unwrap());
        if (tag & ((1 << 8) - 1)) > 1 {
            return Err(Error::InvalidInternalKey(value.to_vec()));
        }
        Ok(InternalKey(value))
    }
}

impl AsRef<[u8]> for InternalKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl InternalKey {
    pub fn ukey(&self) -> &[u8] {
        self.as_ref()[..self.0.len() - 8].as_ref()
    }

    pub fn kind(&self) -> InternalKeyKind {
        let tag = u64::from_le_bytes(
            self.0.as_ref()[self.0.len() - 8..]
                .to_vec()
                .try_into()
                .unwrap(),
        );
        match tag & ((1 << 8) - 1) {
            0 => Delete,
            1 => Set,
            _ => panic!("invalid internal key kind"),
        }
    }

    pub fn seq_num(&self) -> u64 {
        let tag = u64::from_le_bytes(
            self.0.as_ref()[self.0.len() - 8..]
                .to_vec()
                .try_into()
                .unwrap(),
        );
        tag >> 8
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InternalKeyKind {
    Delete = 0,
    Set = 1,
}

impl Default for InternalKeyKind {
    fn default() -> Self {
        Set
    }
}

// A point-lookup key for one user key at one sequence number, pre-encoded
// in the form the memtable feeds to its skiplist: a length-prefixed
// internal key. Building it once up front lets a lookup seek without any
// further allocation.
pub struct LookupKey {
    key: BytesMut,
    ukey_start: usize,
}

impl LookupKey {
    pub fn new(ukey: &[u8], seq_num: u64) -> Self {
        debug_assert!(seq_num <= MAX_SEQ_NUM);
        let mut key = BytesMut::with_capacity(ukey.len() + 13);
        put_uvarint(&mut key, (ukey.len() + 8) as u64);
        let ukey_start = key.len();
        key.put_slice(ukey);
        // seek with the Set kind: tags order newest first, so this lands
        // on the newest entry at or below seq_num for this user key
        key.put_u64_le((seq_num << 8) | (Set as u64));
        LookupKey { key, ukey_start }
    }

    // varint32(len) || ukey || tag, ready for a memtable seek
    pub fn memtable_key(&self) -> &[u8] {
        self.key.as_ref()
    }

    // ukey || tag
    pub fn internal_key(&self) -> &[u8] {
        &self.key.as_ref()[self.ukey_start..]
    }

    pub fn user_key(&self) -> &[u8] {
        let k = self.key.as_ref();
        &k[self.ukey_start..k.len() - 8]
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalKeyComparator {
    pub(crate) u: ComparatorImpl,
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() < 8 || b.len() < 8 {
            panic!("invalid internal keys for comparing")
        }
        match self.u.compare(&a[..a.len() - 8], &b[..b.len() - 8]) {
            Ordering::Equal => {
                let atag = u64::from_le_bytes(a[a.len() - 8..].to_vec().try_into().unwrap());
                let btag = u64::from_le_bytes(b[b.len() - 8..].to_vec().try_into().unwrap());
                // bigger tags first: the newest version of a user key must
                // be the one a seek lands on
                btag.cmp(&atag)
            }
            o => o,
        }
    }

    fn name(&self) -> &'static str {
        "skipbuf.InternalKeyComparator"
    }

    // the order this comparator wraps: lookups compare bare user keys
    // against it after a seek
    fn user_comparator(&self) -> ComparatorImpl {
        self.u
    }
}

impl From<ComparatorImpl> for InternalKeyComparator {
    fn from(u: ComparatorImpl) -> Self {
        Self { u }
    }
}

impl InternalKeyComparator {
    pub(crate) fn compare_keyref(&self, a: &InternalKeyRef, b: &InternalKeyRef) -> Ordering {
        match self.u.compare(a.ukey, b.ukey) {
            Ordering::Equal => match b.seq_num.cmp(&a.seq_num) {
                // same user key and sequence: order on the kind byte, still
                // reversed, as part of the tag
                Ordering::Equal => (b.k as u8).cmp(&(a.k as u8)),
                o => o,
            },
            o => o,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::compare::{Comparator, BYTEWISE_COMPARATOR};
    use crate::key::{
        InternalKey, InternalKeyComparator, InternalKeyKind, InternalKeyRef, LookupKey,
    };
    use crate::utils::varint::uvarint;
    use crate::Error;
    use bytes::{BufMut, Bytes, BytesMut};
    use std::cmp::Ordering;

    #[test]
    fn test_internal_key() {
        // listed in increasing internal-key order: user keys ascend, and
        // within one user key bigger sequence numbers come first
        let key_nums = vec![
            ("a", 2u64),
            ("a", 1),
            ("aa", 3),
            ("ab", 4),
            ("long", 1 << 24),
            ("long", 1 << 8),
        ]
        .iter()
        .map(|(k, n)| (Bytes::from(*k), *n))
        .collect::<Vec<(Bytes, u64)>>();
        let ikeys = key_nums
            .iter()
            .map(|(k, n)| InternalKeyRef::from((k.as_ref(), *n)))
            .collect::<Vec<InternalKeyRef>>();
        let ic = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        assert_eq!(ic.user_comparator().name(), BYTEWISE_COMPARATOR.name());
        for i in 0..key_nums.len() {
            assert_eq!(key_nums[i].0.as_ref(), ikeys[i].ukey);
            assert_eq!(key_nums[i].1, ikeys[i].seq_num);
            if i > 0 {
                assert_eq!(
                    ic.compare_keyref(&ikeys[i], &ikeys[i - 1]),
                    Ordering::Greater
                );
                let a = ikeys[i].to_owned();
                let b = ikeys[i - 1].to_owned();
                assert_eq!(ic.compare(a.as_ref(), b.as_ref()), Ordering::Greater);
            }
        }
    }

    #[test]
    fn test_internal_key_ref() {
        let keys = vec![
            (b"a", 1u64, InternalKeyKind::Set),
            (b"b", 2, InternalKeyKind::Delete),
            (b"b", 3, InternalKeyKind::Set),
        ];
        let mut refs = vec![];
        for (d, n, k) in keys.iter() {
            let mut r = InternalKeyRef::from((d.as_ref(), *n));
            r.k = *k;
            refs.push(r);
        }
        for (i, r) in refs.iter().enumerate() {
            let ik = r.to_owned();
            assert_eq!(ik.ukey(), keys[i].0.as_ref());
            assert_eq!(ik.seq_num(), keys[i].1);
            assert_eq!(ik.kind(), keys[i].2);
        }
    }

    #[test]
    fn test_invalid_internal_key() {
        let mut bad_kind = BytesMut::from(&b"k"[..]);
        bad_kind.put_u64_le((7 << 8) | 2);
        match InternalKey::try_from(bad_kind.freeze()) {
            Err(Error::InvalidInternalKey(_)) => {}
            other => panic!("expected InvalidInternalKey, got {:?}", other),
        }
        assert!(InternalKey::try_from(Bytes::from_static(b"short")).is_err());
    }

    #[test]
    fn test_lookup_key() {
        let lk = LookupKey::new(b"wave", 99);
        assert_eq!(lk.user_key(), b"wave");
        assert_eq!(lk.internal_key().len(), 4 + 8);
        assert_eq!(&lk.internal_key()[..4], b"wave");
        // memtable key = varint-framed internal key
        let (l, n) = uvarint(lk.memtable_key()).unwrap();
        assert_eq!(l, 12);
        assert_eq!(&lk.memtable_key()[n..], lk.internal_key());
        let ikr = InternalKeyRef::from(lk.internal_key());
        assert_eq!(ikr.seq_num, 99);
        assert_eq!(ikr.k, InternalKeyKind::Set);
    }

    #[test]
    fn test_lookup_key_ordering() {
        // a lookup at seq s must sort before (land on) versions <= s and
        // after versions > s of the same user key
        let ic = InternalKeyComparator::from(BYTEWISE_COMPARATOR);
        let lk = LookupKey::new(b"k", 10);
        let newer = InternalKeyRef::from((b"k".as_ref(), 11)).to_owned();
        let same = InternalKeyRef::from((b"k".as_ref(), 10)).to_owned();
        let older = InternalKeyRef::from((b"k".as_ref(), 9)).to_owned();
        assert_eq!(
            ic.compare(lk.internal_key(), newer.as_ref()),
            Ordering::Greater
        );
        assert_eq!(ic.compare(lk.internal_key(), same.as_ref()), Ordering::Equal);
        assert_eq!(ic.compare(lk.internal_key(), older.as_ref()), Ordering::Less);
    }
}
