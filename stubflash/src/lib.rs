//! # stubflash
//!
//! Host side engine which programs the flash of a microcontroller by running
//! a flash algorithm on the target itself.
//!
//! A flash algorithm is a small, address-fixed piece of machine code. The
//! engine loads it into target RAM over an existing debug connection, calls
//! its entry points to erase and program the flash, and streams the page data
//! through two RAM buffers so the host can transfer the next page while the
//! target is still programming the current one.
//!
//! The debug connection itself is not part of this crate. It is represented by
//! the [`CoreInterface`] and [`MemoryInterface`] traits. A simulated core for
//! dry runs and tests is available as [`probe::fake_core::FakeCore`].
//!
//! ## Example
//!
//! ```
//! use stubflash::{
//!     flashing::{DownloadOptions, FlashLoader},
//!     probe::fake_core::FakeCore,
//!     Session,
//! };
//!
//! let target = stubflash::config::get_target_by_name("HC32F4A0xI")?;
//! let core = FakeCore::with_flash_emulation(&target);
//!
//! let mut session = Session::attach(core, target);
//!
//! let mut loader = session.target().flash_loader();
//! loader.add_data(0x0, &[0xde, 0xad, 0xbe, 0xef])?;
//! loader.commit(&mut session, DownloadOptions::default())?;
//!
//! # Ok::<(), anyhow::Error>(())
//! ```
#![warn(missing_docs)]

pub mod config;
pub mod core;
mod error;
pub mod flashing;
mod memory;
pub mod probe;
mod session;
#[cfg(feature = "builtin-targets")]
pub mod vendor;

pub use crate::config::{RegistryError, Target};
pub use crate::core::{
    CoreInterface, CoreRegister, CoreRegisters, InstructionSet, RegisterId, RegisterRole,
};
pub use crate::error::Error;
pub use crate::memory::{MemoryInterface, MemoryNotAlignedError};
pub use crate::session::{FixupWarning, Session};
