use crate::compare::{ComparatorImpl, BYTEWISE_COMPARATOR};
use crate::key::InternalKeyComparator;
use std::sync::Arc;

pub type Opts = Arc<OptsRaw>;

pub struct OptsRaw {
    pub comparer: ComparatorImpl,
    pub write_buffer_size: u64,
}

pub fn default_opts() -> Opts {
    Arc::new(OptsRaw::default())
}

impl Default for OptsRaw {
    fn default() -> Self {
        Self {
            comparer: BYTEWISE_COMPARATOR,
            write_buffer_size: 4 * 1024 * 1024,
        }
    }
}

impl OptsRaw {
    pub fn get_ucmp(&self) -> ComparatorImpl {
        self.comparer
    }

    pub fn get_icmp(&self) -> InternalKeyComparator {
        InternalKeyComparator { u: self.comparer }
    }

    pub fn get_write_buffer_size(&self) -> u64 {
        if self.write_buffer_size == 0 {
            4 * 1024 * 1024
        } else {
            self.write_buffer_size
        }
    }
}
