use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::os::{Keyboard, KeyboardState};

const KEY_COUNT: usize = 256;

fn key_index(vk: i32) -> Option<usize> {
    usize::try_from(vk).ok().filter(|&vk| vk < KEY_COUNT)
}

/// Keyboard of a [`DummyOs`](super::DummyOs).
///
/// Keys only change when they are set through [`Keyboard::set_down`]. Every keyboard obtained from
/// the same OS shares the key state.
#[derive(Clone)]
pub struct DummyKeyboard {
    keys: Arc<Mutex<[bool; KEY_COUNT]>>,
}

impl DummyKeyboard {
    pub(crate) fn new() -> Self {
        Self {
            keys: Arc::new(Mutex::new([false; KEY_COUNT])),
        }
    }
}

impl Keyboard for DummyKeyboard {
    type KeyboardStateType = DummyKeyboardState;

    fn is_down(&mut self, vk: i32) -> bool {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        key_index(vk).map(|i| keys[i]).unwrap_or_default()
    }

    fn set_down(&mut self, vk: i32, down: bool) {
        if let Some(i) = key_index(vk) {
            self.keys.lock().unwrap_or_else(PoisonError::into_inner)[i] = down;
        }
    }

    fn state(&mut self) -> Result<DummyKeyboardState> {
        Ok(DummyKeyboardState {
            keys: *self.keys.lock().unwrap_or_else(PoisonError::into_inner),
        })
    }
}

/// Snapshot of a [`DummyKeyboard`].
#[derive(Clone)]
pub struct DummyKeyboardState {
    keys: [bool; KEY_COUNT],
}

impl KeyboardState for DummyKeyboardState {
    fn is_down(&self, vk: i32) -> bool {
        key_index(vk).map(|i| self.keys[i]).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_detached() {
        let mut kbd = DummyKeyboard::new();
        kbd.set_down(0x41, true);
        let state = kbd.state().unwrap();
        kbd.set_down(0x41, false);

        assert!(state.is_down(0x41));
        assert!(!kbd.is_down(0x41));
    }

    #[test]
    fn out_of_range_keys() {
        let mut kbd = DummyKeyboard::new();
        kbd.set_down(-1, true);
        kbd.set_down(1000, true);
        assert!(!kbd.is_down(-1));
        assert!(!kbd.state().unwrap().is_down(1000));
    }
}
