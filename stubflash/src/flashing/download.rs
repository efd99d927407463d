use std::{fs::File, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{FlashError, FlashProgress};
use crate::{core::CoreInterface, session::Session};

/// Extended options for flashing a binary file.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinOptions {
    /// The address in memory where the binary will be put at.
    ///
    /// Defaults to the start of the boot region.
    pub base_address: Option<u64>,
    /// The number of bytes to skip at the start of the binary file.
    pub skip: u32,
}

/// A finite list of all the available binary formats stubflash understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Format {
    /// Marks a file in binary format. This means that the file contains the contents of the flash 1:1.
    /// [BinOptions] can be used to define the location in flash where the file contents should be put at.
    /// Additionally using the same config struct, you can skip the first N bytes of the binary file to have them not put into the flash.
    Bin(BinOptions),
    /// Marks a file in [Intel HEX](https://en.wikipedia.org/wiki/Intel_HEX) format.
    Hex,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase()[..] {
            "bin" | "binary" => Ok(Format::Bin(BinOptions::default())),
            "hex" | "ihex" | "intelhex" => Ok(Format::Hex),
            _ => Err(format!("Format '{s}' is unknown.")),
        }
    }
}

/// A finite list of all the errors that can occur when flashing a given file.
///
/// This includes corrupt file issues,
/// OS permission issues as well as chip connectivity and memory boundary issues.
#[derive(Debug, Error)]
pub enum FileDownloadError {
    /// An error with the actual flashing procedure has occured.
    #[error("Error while flashing")]
    Flash(#[from] FlashError),
    /// Reading and decoding the IHEX file has failed due to the given error.
    #[error("Could not read ihex format")]
    IhexRead(#[from] ihex::ReaderError),
    /// An IO error has occured while reading the firmware file.
    #[error("I/O error")]
    IO(#[from] std::io::Error),
}

/// Options for downloading a file onto a target chip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// An optional progress reporter which is used if this argument is set to `Some(...)`.
    #[serde(skip)]
    pub progress: Option<FlashProgress>,
    /// Erase each programmed region with `EraseAll()` instead of erasing
    /// the touched sectors.
    pub do_chip_erase: bool,
    /// Do not erase anything before programming.
    pub skip_erase: bool,
    /// Stream pages through both page buffers if the algorithm has two.
    pub enable_double_buffering: bool,
    /// Read the flash back after programming and compare it.
    pub verify: bool,
    /// Read the algorithm image back after loading it into RAM.
    pub verify_algorithm_load: bool,
    /// Overrides the timeouts of all routine calls.
    pub timeout: Option<Duration>,
    /// Delay between two polls of the core status while a routine runs.
    pub poll_interval: Duration,
    /// Byte used for the gaps inside a page.
    ///
    /// Defaults to the erased byte value of the flash algorithm.
    pub fill_byte: Option<u8>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            progress: None,
            do_chip_erase: false,
            skip_erase: false,
            enable_double_buffering: true,
            verify: false,
            verify_algorithm_load: true,
            timeout: None,
            poll_interval: Duration::from_millis(1),
            fill_byte: None,
        }
    }
}

/// Downloads a file of given `format` at `path` to the flash of the target given in `session`.
///
/// This will ensure that memory bounderies are honored and does erasing and programming of the flash for you.
///
/// If you are looking for more options, have a look at [download_file_with_options].
pub fn download_file<C: CoreInterface>(
    session: &mut Session<C>,
    path: impl AsRef<Path>,
    format: Format,
) -> Result<(), FileDownloadError> {
    download_file_with_options(session, path, format, DownloadOptions::default())
}

/// Downloads a file of given `format` at `path` to the flash of the target given in `session`.
///
/// If you are looking for a simple version without many options, have a look at [download_file].
pub fn download_file_with_options<C: CoreInterface>(
    session: &mut Session<C>,
    path: impl AsRef<Path>,
    format: Format,
    options: DownloadOptions,
) -> Result<(), FileDownloadError> {
    let mut file = File::open(path.as_ref())?;

    let mut loader = session.target().flash_loader();

    match format {
        Format::Bin(options) => loader.load_bin_data(&mut file, options),
        Format::Hex => loader.load_hex_data(&mut file),
    }?;

    loader
        .commit(session, options)
        .map_err(FileDownloadError::Flash)
}
