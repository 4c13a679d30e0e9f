//! Describes optional keyboard input for a Operating System

use crate::error::Result;

/// Keyboard access of an OS layer.
pub trait OsKeyboard: Send {
    /// Keyboard borrowing the OS.
    type KeyboardType<'a>: Keyboard + 'a
    where
        Self: 'a;
    /// Keyboard that took over the resources of the OS.
    type IntoKeyboardType: Keyboard + Clone + 'static;

    fn keyboard(&mut self) -> Result<Self::KeyboardType<'_>>;

    fn into_keyboard(self) -> Result<Self::IntoKeyboardType>
    where
        Self: Sized;
}

/// Live keyboard of the target.
///
/// Keys are identified by their virtual key code.
pub trait Keyboard: Send {
    type KeyboardStateType: KeyboardState + 'static;

    fn is_down(&mut self, vk: i32) -> bool;
    fn set_down(&mut self, vk: i32, down: bool);

    /// Takes a snapshot of all keys.
    fn state(&mut self) -> Result<Self::KeyboardStateType>;
}

/// Snapshot of the keyboard.
pub trait KeyboardState: Send {
    fn is_down(&self, vk: i32) -> bool;
}
