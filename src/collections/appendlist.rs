//! Single-writer, non-blocking-reader append list.
//!
//! Every RCW keeps a small list of cached native interface pointers that is read on
//! each managed-to-native call but written only when a new interface is first
//! resolved. A mutex would put a lock acquisition on every call; this list instead
//! lets unbounded concurrent readers snapshot `(array, count)` without blocking,
//! while at most one writer appends at a time.
//!
//! The whole structure hinges on one ordering contract:
//!
//! 1. The writer publishes a grown array (Release) *before* publishing the new
//!    count (Release).
//! 2. A reader loads the count (Acquire) *before* loading the array pointer.
//!
//! A reader therefore never observes a count larger than the length of the array
//! snapshot it obtains, and never observes a torn element: a slot is only readable
//! once a count covering it has been published, and that publication
//! happens-after the slot write. Replaced arrays are retired, not freed, for the
//! lifetime of the list so a reader's snapshot stays valid however long it holds it.
//!
//! [`InlineAppendList`] wraps the list with one slot of inline storage, avoiding any
//! heap allocation for the overwhelmingly common case of a single cached entry.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

const LOCK_BIT: usize = 1;
const INITIAL_CAPACITY: usize = 2;

type Slot<T> = UnsafeCell<MaybeUninit<T>>;

/// Backing arrays. Mutated only while the writer lock bit is held.
struct Storage<T> {
    current: Option<Box<[Slot<T>]>>,
    /// Arrays replaced by growth. Kept alive so outstanding reader snapshots
    /// remain valid; freed when the list itself is dropped.
    retired: Vec<Box<[Slot<T>]>>,
}

/// Growable sequence allowing unbounded lock-free readers and one spinning writer.
///
/// `T: Copy` keeps snapshot reads trivially valid (no element drop glue, no
/// aliasing hazards when the writer copies elements into a grown array).
///
/// # Examples
///
/// ```rust
/// use combridge::collections::AppendList;
///
/// let list: AppendList<u64> = AppendList::new();
/// list.add(7);
/// list.add(9);
/// assert_eq!(list.iter().collect::<Vec<_>>(), vec![7, 9]);
/// ```
pub struct AppendList<T: Copy> {
    /// Bit 0: writer lock. Remaining bits: element count.
    state: AtomicUsize,
    /// Published pointer to the first slot of the current array.
    array: AtomicPtr<Slot<T>>,
    storage: UnsafeCell<Storage<T>>,
}

// Readers share &self across threads; all mutation is funneled through the lock
// bit and the publish ordering described in the module docs.
unsafe impl<T: Copy + Send> Send for AppendList<T> {}
unsafe impl<T: Copy + Send + Sync> Sync for AppendList<T> {}

impl<T: Copy> Default for AppendList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> AppendList<T> {
    /// Creates an empty list. No allocation happens until the first append.
    #[must_use]
    pub fn new() -> Self {
        AppendList {
            state: AtomicUsize::new(0),
            array: AtomicPtr::new(ptr::null_mut()),
            storage: UnsafeCell::new(Storage {
                current: None,
                retired: Vec::new(),
            }),
        }
    }

    /// Spin until the lock bit is acquired; returns the element count at acquisition.
    fn acquire_lock_and_get_count(&self) -> usize {
        loop {
            let old = self.state.load(Ordering::Acquire);
            if old & LOCK_BIT == 0
                && self
                    .state
                    .compare_exchange_weak(old, old | LOCK_BIT, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return old >> 1;
            }
            std::hint::spin_loop();
        }
    }

    /// Publish `new_count` and drop the lock bit in one Release store.
    ///
    /// The Release ordering is what makes every slot write (and any array
    /// publication) visible to a reader that acquires this count.
    fn release_lock_and_set_count(&self, new_count: usize) {
        debug_assert!(self.state.load(Ordering::Relaxed) & LOCK_BIT == 1);
        self.state.store(new_count << 1, Ordering::Release);
    }

    /// Writes `value` into slot `index`, growing (and republishing) the array first
    /// if needed. Caller must hold the lock bit; `index` must not be covered by the
    /// published count yet.
    fn set_slot(&self, index: usize, value: T) {
        // Safe: storage is only touched under the lock bit.
        let storage = unsafe { &mut *self.storage.get() };

        let old_len = storage.current.as_ref().map_or(0, |a| a.len());

        if index >= old_len {
            let mut new_len = if old_len == 0 { INITIAL_CAPACITY } else { old_len * 2 };
            while new_len <= index {
                new_len *= 2;
            }

            let new_array: Box<[Slot<T>]> = (0..new_len)
                .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
                .collect();

            if let Some(old) = storage.current.take() {
                // Only slots below `index` are initialized (append-only).
                for i in 0..index.min(old.len()) {
                    unsafe {
                        (*new_array[i].get()).write((*old[i].get()).assume_init());
                    }
                }
                storage.retired.push(old);
            }

            let first = new_array.as_ptr() as *mut Slot<T>;
            storage.current = Some(new_array);

            // Publish the grown array before the count that will reference it.
            self.array.store(first, Ordering::Release);
        }

        let array = storage.current.as_ref().expect("array exists after growth");
        unsafe {
            (*array[index].get()).write(value);
        }
    }

    /// Snapshot `(count, array)` with the reader-side ordering: count first
    /// (Acquire), then the array pointer.
    fn snapshot(&self) -> (usize, *const Slot<T>) {
        let count = self.state.load(Ordering::Acquire) >> 1;
        let array = self.array.load(Ordering::Acquire);
        (count, array)
    }

    /// Appends `value`.
    ///
    /// At most one writer proceeds at a time; a concurrent `add` spins. Readers are
    /// never blocked and observe the element exactly when the new count is published.
    pub fn add(&self, value: T) {
        let old_count = self.acquire_lock_and_get_count();
        self.set_slot(old_count, value);
        self.release_lock_and_set_count(old_count + 1);
    }

    /// Number of published elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.load(Ordering::Acquire) >> 1
    }

    /// Returns `true` if no element has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates a consistent snapshot taken at the time of the call.
    ///
    /// Elements appended after the call do not appear; elements in the snapshot are
    /// fully written.
    pub fn iter(&self) -> AppendListIter<'_, T> {
        let (count, array) = self.snapshot();
        AppendListIter {
            array,
            count,
            index: 0,
            _list: PhantomData,
        }
    }
}

/// Snapshot iterator over an [`AppendList`].
pub struct AppendListIter<'a, T: Copy> {
    array: *const Slot<T>,
    count: usize,
    index: usize,
    _list: PhantomData<&'a AppendList<T>>,
}

impl<T: Copy> Iterator for AppendListIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.index >= self.count {
            return None;
        }
        // The published count covers this slot, so the write happened-before our
        // Acquire of the count; the array outlives the borrow of the list.
        let value = unsafe { (*(*self.array.add(self.index)).get()).assume_init() };
        self.index += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

/// [`AppendList`] with one slot of inline storage.
///
/// Element 0 lives inline in the owning structure; the heap-backed list is only
/// touched from element 1 on. RCW interface caches are almost always length 1, so
/// this removes the allocation from the common path entirely.
pub struct InlineAppendList<T: Copy> {
    list: AppendList<T>,
    item0: Slot<T>,
}

unsafe impl<T: Copy + Send> Send for InlineAppendList<T> {}
unsafe impl<T: Copy + Send + Sync> Sync for InlineAppendList<T> {}

impl<T: Copy> Default for InlineAppendList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> InlineAppendList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        InlineAppendList {
            list: AppendList::new(),
            item0: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Appends `value`, using the inline slot for element 0.
    pub fn add(&self, value: T) {
        let old_count = self.list.acquire_lock_and_get_count();

        if old_count == 0 {
            unsafe {
                (*self.item0.get()).write(value);
            }
        } else {
            self.list.set_slot(old_count - 1, value);
        }

        self.list.release_lock_and_set_count(old_count + 1);
    }

    /// Stores the first element without synchronization.
    ///
    /// Only valid on a list that has never been shared or appended to; the owner
    /// holds `&mut self`, so no reader can exist yet.
    pub fn add_first(&mut self, value: T) {
        debug_assert_eq!(self.list.state.load(Ordering::Relaxed), 0);
        unsafe {
            (*self.item0.get()).write(value);
        }
        self.list.state.store(1 << 1, Ordering::Release);
    }

    /// Number of published elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Returns `true` if no element has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Iterates a consistent snapshot taken at the time of the call.
    pub fn iter(&self) -> InlineAppendListIter<'_, T> {
        let (count, array) = self.list.snapshot();
        let item0 = if count > 0 {
            // Covered by the published count, same argument as the spilled slots.
            Some(unsafe { (*self.item0.get()).assume_init() })
        } else {
            None
        };

        InlineAppendListIter {
            item0,
            tail: AppendListIter {
                array,
                count: count.saturating_sub(1),
                index: 0,
                _list: PhantomData,
            },
        }
    }
}

/// Snapshot iterator over an [`InlineAppendList`].
pub struct InlineAppendListIter<'a, T: Copy> {
    item0: Option<T>,
    tail: AppendListIter<'a, T>,
}

impl<T: Copy> Iterator for InlineAppendListIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let Some(first) = self.item0.take() {
            return Some(first);
        }
        self.tail.next()
    }
}
