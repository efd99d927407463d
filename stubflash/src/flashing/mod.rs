//! Flash programming operations.
//!
//! This module loads a flash algorithm into target RAM and drives its
//! routines to erase and program non-volatile memory.
//!
//! It provides a convenient high level interface that can flash an IHEX or BIN file
//! as well as a lower level block based interface.
//!
//! ## Examples
//!
//! ### Flashing a binary
//!
//! The easiest way to flash a binary is using the [`download_file`] function,
//! and looks like this:
//!
//! ```no_run
//! use stubflash::{flashing, probe::fake_core::FakeCore, Session};
//!
//! let target = stubflash::config::get_target_by_name("HC32F4A0xI")?;
//! let mut session = Session::attach(FakeCore::with_flash_emulation(&target), target);
//!
//! flashing::download_file(&mut session, "binary.hex", flashing::Format::Hex)?;
//!
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ### Driving the algorithm directly
//!
//! ```
//! use stubflash::{flashing::{DownloadOptions, Flasher}, probe::fake_core::FakeCore, Session};
//!
//! let target = stubflash::config::get_target_by_name("HC32F4A0xG")?;
//! let mut session = Session::attach(FakeCore::with_flash_emulation(&target), target.clone());
//!
//! let region = target.select_region(0x4000, 0x800)?;
//! let algorithm = target.flash_algorithm_for_region(region)?;
//!
//! let mut flasher = Flasher::new(&mut session, algorithm, region, &DownloadOptions::default())?;
//! flasher.run_erase(|active| active.erase_sector(0x4000))?;
//!
//! # Ok::<(), anyhow::Error>(())
//! ```

mod builder;
mod download;
mod erase;
mod error;
mod flash_algorithm;
mod flasher;
mod loader;
mod progress;

use builder::FlashBuilder;

pub use builder::{FlashLayout, FlashPage, FlashSector};
pub use download::*;
pub use erase::*;
pub use error::*;
pub use flash_algorithm::*;
pub use flasher::{ActiveFlasher, Erase, Flasher, Operation, Program, Verify};
pub use loader::*;
pub use progress::*;
