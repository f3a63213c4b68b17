use mutex::raw_impls::cs::CriticalSectionRawMutex;
use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

/// A single shared record. Writers always replace (or modify) the whole
/// record under the lock, and readers always receive a full copy, so a reader
/// can never observe a half-written record.
pub struct Watch<T, M: ScopedRawMutex = CriticalSectionRawMutex> {
    state: BlockingMutex<M, State<T>>,
}

struct State<T> {
    value: T,
    msg_id: usize,
}

impl<T: Clone, M: ScopedRawMutex> Watch<T, M> {
    pub const fn new(value: T) -> Self
    where
        M: ConstInit,
    {
        Self {
            state: BlockingMutex::new(State { value, msg_id: 0 }),
        }
    }

    /// Get a copy of the current record.
    pub fn get(&self) -> T {
        self.state.with_lock(|state| state.value.clone())
    }

    /// Get a copy of the current record together with its message id.
    pub fn get_with_id(&self) -> (T, usize) {
        self.state
            .with_lock(|state| (state.value.clone(), state.msg_id))
    }

    pub fn is(&self, other: &T) -> bool
    where
        T: PartialEq,
    {
        self.state.with_lock(|state| &state.value == other)
    }

    /// The message id is incremented on every write, which allows consumers
    /// to detect that a record has been republished.
    pub fn get_msg_id(&self) -> usize {
        self.state.with_lock(|state| state.msg_id)
    }

    /// Replace the whole record.
    pub fn send(&self, value: T) {
        self.state.with_lock(|state| {
            state.msg_id = state.msg_id.wrapping_add(1);
            state.value = value;
        });
    }

    /// Read-modify-write the record in a single critical section.
    pub fn modify(&self, func: impl FnOnce(&mut T)) {
        self.state.with_lock(|state| {
            state.msg_id = state.msg_id.wrapping_add(1);
            func(&mut state.value);
        });
    }
}
