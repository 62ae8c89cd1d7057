//! The array table.
//!
//! Arrays are identified by table index; freed slots keep their entry
//! with empty data and are recycled LIFO through the free list. An id
//! is stable for the whole mutator step between two collections.

use opal_core::{handle_to_id, id_to_handle, is_handle};

/// Allocations between collections before a GC is triggered.
pub const DEFAULT_GC_THRESHOLD: usize = 100;

/// One heap array: its words plus the collector's mark bit.
#[derive(Debug, Default)]
pub struct Array {
    pub data: Vec<i64>,
    pub marked: bool,
}

/// The array table with its free list and allocation counter.
#[derive(Debug)]
pub struct Heap {
    pub(crate) arrays: Vec<Array>,
    pub(crate) free_list: Vec<usize>,
    alloc_count: usize,
    gc_threshold: usize,
}

impl Heap {
    /// Create a heap with the given collection threshold.
    #[must_use]
    pub fn new(gc_threshold: usize) -> Self {
        Heap {
            arrays: Vec::new(),
            free_list: Vec::new(),
            alloc_count: 0,
            gc_threshold,
        }
    }

    /// Current table length (live and freed slots alike).
    #[inline]
    pub fn table_len(&self) -> usize {
        self.arrays.len()
    }

    /// Number of ids on the free list.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Whether `word` is a valid handle into this table.
    #[inline]
    pub fn is_handle(&self, word: i64) -> bool {
        is_handle(word, self.arrays.len())
    }

    /// Count one allocation against the threshold; true means a
    /// collection is due before the allocation proceeds.
    #[inline]
    pub fn should_collect(&mut self) -> bool {
        self.alloc_count += 1;
        self.alloc_count >= self.gc_threshold
    }

    /// Reset the allocation counter after a collection.
    #[inline]
    pub fn reset_alloc_count(&mut self) {
        self.alloc_count = 0;
    }

    /// Allocate a zero-filled array of `n` words and return its handle.
    /// Freed ids are recycled LIFO before the table grows.
    pub fn alloc(&mut self, n: usize) -> i64 {
        let id = match self.free_list.pop() {
            Some(id) => {
                self.arrays[id].data = vec![0; n];
                self.arrays[id].marked = false;
                id
            }
            None => {
                let id = self.arrays.len();
                self.arrays.push(Array {
                    data: vec![0; n],
                    marked: false,
                });
                id
            }
        };
        id_to_handle(id)
    }

    /// Element read; the caller has validated handle and bounds.
    #[inline]
    pub fn get(&self, handle: i64, idx: usize) -> i64 {
        self.arrays[handle_to_id(handle)].data[idx]
    }

    /// Element write; the caller has validated handle and bounds.
    #[inline]
    pub fn set(&mut self, handle: i64, idx: usize, value: i64) {
        self.arrays[handle_to_id(handle)].data[idx] = value;
    }

    /// Length of the array behind a validated handle.
    #[inline]
    pub fn len_of(&self, handle: i64) -> usize {
        self.arrays[handle_to_id(handle)].data.len()
    }

    /// Borrow the words behind a validated handle.
    #[inline]
    pub fn data_of(&self, handle: i64) -> &[i64] {
        &self.arrays[handle_to_id(handle)].data
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_GC_THRESHOLD)
    }
}
