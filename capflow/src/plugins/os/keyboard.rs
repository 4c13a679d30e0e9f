//! Keyboard function tables and capability objects.

use std::mem::MaybeUninit;

use crate::error::{result_from_int, AsIntResult, Result};
use crate::os::{Keyboard, KeyboardState, OsKeyboard};
use crate::plugins::container::{Capabilities, CloneFunctionTable, Container, LibArc};

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct OsKeyboardFunctionTable {
    pub keyboard: for<'r, 'a> extern "C" fn(
        cont: &'r mut Container<'a>,
        out: &mut MaybeUninit<KeyboardInstance<'r>>,
    ) -> i32,
    pub into_keyboard:
        extern "C" fn(cont: Container<'static>, out: &mut MaybeUninit<IntoKeyboardInstance>) -> i32,
}

impl OsKeyboardFunctionTable {
    pub fn of<T: OsKeyboard + 'static>() -> &'static Self {
        &Self {
            keyboard: c_keyboard::<T>,
            into_keyboard: c_into_keyboard::<T>,
        }
    }
}

extern "C" fn c_keyboard<'r, 'a, T: OsKeyboard + 'static>(
    cont: &'r mut Container<'a>,
    out: &mut MaybeUninit<KeyboardInstance<'r>>,
) -> i32 {
    let lib = cont.context().clone();
    unsafe { cont.instance_mut::<T>() }
        .keyboard()
        .map(|kbd| KeyboardInstance::new(kbd, lib))
        .into_int_out_result(out)
}

extern "C" fn c_into_keyboard<T: OsKeyboard + 'static>(
    cont: Container<'static>,
    out: &mut MaybeUninit<IntoKeyboardInstance>,
) -> i32 {
    match unsafe { cont.into_inner::<T>() } {
        Some((os, lib)) => os
            .into_keyboard()
            .map(|kbd| IntoKeyboardInstance::new(kbd, lib))
            .into_int_out_result(out),
        None => crate::plugins::borrowed_container_error().into_i32(),
    }
}

pub(crate) fn keyboard_from_table<'r>(
    table: &OsKeyboardFunctionTable,
    cont: &'r mut Container,
) -> Result<KeyboardInstance<'r>> {
    let mut out = MaybeUninit::uninit();
    let res = (table.keyboard)(cont, &mut out);
    result_from_int(res, out)
}

pub(crate) fn into_keyboard_from_table(
    table: &OsKeyboardFunctionTable,
    cont: Container<'static>,
) -> Result<IntoKeyboardInstance> {
    let mut out = MaybeUninit::uninit();
    let res = (table.into_keyboard)(cont, &mut out);
    result_from_int(res, out)
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct KeyboardFunctionTable {
    pub is_down: extern "C" fn(cont: &mut Container, vk: i32) -> bool,
    pub set_down: extern "C" fn(cont: &mut Container, vk: i32, down: bool),
    pub state:
        extern "C" fn(cont: &mut Container, out: &mut MaybeUninit<KeyboardStateInstance>) -> i32,
}

impl KeyboardFunctionTable {
    pub fn of<T: Keyboard>() -> &'static Self {
        &Self {
            is_down: c_is_down::<T>,
            set_down: c_set_down::<T>,
            state: c_state::<T>,
        }
    }
}

extern "C" fn c_is_down<T: Keyboard>(cont: &mut Container, vk: i32) -> bool {
    unsafe { cont.instance_mut::<T>() }.is_down(vk)
}

extern "C" fn c_set_down<T: Keyboard>(cont: &mut Container, vk: i32, down: bool) {
    unsafe { cont.instance_mut::<T>() }.set_down(vk, down)
}

extern "C" fn c_state<T: Keyboard>(
    cont: &mut Container,
    out: &mut MaybeUninit<KeyboardStateInstance>,
) -> i32 {
    let lib = cont.context().clone();
    unsafe { cont.instance_mut::<T>() }
        .state()
        .map(|state| KeyboardStateInstance::new(state, lib))
        .into_int_out_result(out)
}

#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct KeyboardStateFunctionTable {
    pub is_down: extern "C" fn(cont: &Container, vk: i32) -> bool,
}

impl KeyboardStateFunctionTable {
    pub fn of<T: KeyboardState>() -> &'static Self {
        &Self {
            is_down: c_state_is_down::<T>,
        }
    }
}

extern "C" fn c_state_is_down<T: KeyboardState>(cont: &Container, vk: i32) -> bool {
    unsafe { cont.instance_ref::<T>() }.is_down(vk)
}

/// Keyboard borrowing an OS.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct KeyboardInstance<'a> {
    keyboard: &'static KeyboardFunctionTable,
    container: Container<'a>,
}

impl<'a> KeyboardInstance<'a> {
    pub fn new<T: Keyboard + 'a>(keyboard: T, lib: LibArc) -> Self {
        Self {
            keyboard: KeyboardFunctionTable::of::<T>(),
            container: Container::new(keyboard, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::KEYBOARD
    }
}

/// Keyboard that took over the resources of an OS.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct IntoKeyboardInstance {
    clone: &'static CloneFunctionTable,
    keyboard: &'static KeyboardFunctionTable,
    container: Container<'static>,
}

impl IntoKeyboardInstance {
    pub fn new<T: Keyboard + Clone + 'static>(keyboard: T, lib: LibArc) -> Self {
        Self {
            clone: CloneFunctionTable::of::<T>(),
            keyboard: KeyboardFunctionTable::of::<T>(),
            container: Container::new(keyboard, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::CLONE | Capabilities::KEYBOARD
    }
}

impl Clone for IntoKeyboardInstance {
    fn clone(&self) -> Self {
        Self {
            clone: self.clone,
            keyboard: self.keyboard,
            container: (self.clone.clone)(&self.container),
        }
    }
}

macro_rules! impl_keyboard {
    ($ty:ty $(, $gen:lifetime)?) => {
        impl<$($gen)?> Keyboard for $ty {
            type KeyboardStateType = KeyboardStateInstance;

            fn is_down(&mut self, vk: i32) -> bool {
                (self.keyboard.is_down)(&mut self.container, vk)
            }

            fn set_down(&mut self, vk: i32, down: bool) {
                (self.keyboard.set_down)(&mut self.container, vk, down)
            }

            fn state(&mut self) -> Result<KeyboardStateInstance> {
                let mut out = MaybeUninit::uninit();
                let res = (self.keyboard.state)(&mut self.container, &mut out);
                result_from_int(res, out)
            }
        }
    };
}

impl_keyboard!(KeyboardInstance<'a>, 'a);
impl_keyboard!(IntoKeyboardInstance);

/// Snapshot of a keyboard.
#[repr(C)]
#[derive(::abi_stable::StableAbi)]
pub struct KeyboardStateInstance {
    keyboard_state: &'static KeyboardStateFunctionTable,
    container: Container<'static>,
}

impl KeyboardStateInstance {
    pub fn new<T: KeyboardState + 'static>(state: T, lib: LibArc) -> Self {
        Self {
            keyboard_state: KeyboardStateFunctionTable::of::<T>(),
            container: Container::new(state, lib),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::KEYBOARD_STATE
    }
}

impl KeyboardState for KeyboardStateInstance {
    fn is_down(&self, vk: i32) -> bool {
        (self.keyboard_state.is_down)(&self.container, vk)
    }
}
