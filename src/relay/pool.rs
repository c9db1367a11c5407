//! Process-wide pool of 64 KiB buffers for the UDP pumps.
//!
//! Each pump holds one slot for its whole session; the pool bounds
//! allocation churn under high ASSOCIATE turnover.

use std::ops::{Deref, DerefMut};
use std::sync::{LazyLock, Mutex};

/// One slot fits a maximum-size UDP datagram plus encapsulation header.
pub(crate) const SLOT_SIZE: usize = 64 * 1024;

const MAX_IDLE: usize = 32;

static FREE: LazyLock<Mutex<Vec<Box<[u8]>>>> = LazyLock::new(|| Mutex::new(Vec::new()));

/// A pooled buffer; returns to the pool on drop.
pub(crate) struct Slot(Option<Box<[u8]>>);

pub(crate) fn take() -> Slot {
    let recycled = FREE.lock().ok().and_then(|mut free| free.pop());
    Slot(Some(recycled.unwrap_or_else(|| {
        vec![0u8; SLOT_SIZE].into_boxed_slice()
    })))
}

impl Deref for Slot {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for Slot {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.0.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(buf) = self.0.take() {
            if let Ok(mut free) = FREE.lock() {
                if free.len() < MAX_IDLE {
                    free.push(buf);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_full_size_and_recycled() {
        let slot = take();
        assert_eq!(slot.len(), SLOT_SIZE);
        drop(slot);

        let again = take();
        assert_eq!(again.len(), SLOT_SIZE);
    }
}
