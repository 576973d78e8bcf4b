use std::cmp::Ordering;
use std::fmt::Debug;

pub static BYTEWISE_COMPARATOR: &'static dyn Comparator =
    &BytewiseComparator {} as &'static dyn Comparator;

// A strict weak order over byte strings. Implementations must be
// stateless values: the same comparator is shared by every structure
// built over it, and two comparators with the same name() must order
// identically.
pub trait Comparator: Send + Sync + Debug + 'static {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn name(&self) -> &'static str;

    // Comparators that wrap another order expose the wrapped one here;
    // a plain byte order is its own user comparator. The internal-key
    // comparator wraps the user's order and overrides this.
    fn user_comparator(&self) -> ComparatorImpl;
}

pub type ComparatorImpl = &'static dyn Comparator;

#[derive(Default, Clone, Copy, Debug)]
pub struct BytewiseComparator {}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "BytewiseComparator"
    }

    fn user_comparator(&self) -> ComparatorImpl {
        BYTEWISE_COMPARATOR
    }
}
