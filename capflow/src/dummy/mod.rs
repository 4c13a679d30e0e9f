//! In-process connector and OS layer for tests and examples.

pub mod keyboard;
pub mod mapping;
pub mod mem;
pub mod os;
pub mod process;

pub use keyboard::{DummyKeyboard, DummyKeyboardState};
pub use mem::{DummyCpuState, DummyMemory, CAPFLOW_CONNECTOR_DUMMY};
pub use os::{DummyOs, CAPFLOW_OS_DUMMY};
pub use process::{DummyModule, DummyProcess, DummyProcessInfo};
