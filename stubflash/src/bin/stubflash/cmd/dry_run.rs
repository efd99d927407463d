use std::cell::Cell;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use stubflash::config::RawFlashAlgorithm;
use stubflash::flashing::{
    download_file_with_options, BinOptions, DownloadOptions, FlashProgress, Format, ProgressEvent,
};
use stubflash::probe::fake_core::{FakeCore, TraceEvent};
use stubflash::{Session, Target};

#[derive(clap::Parser)]
pub struct Cmd {
    /// The target chip.
    #[clap(long)]
    chip: String,
    /// Path to a YAML target description to add before looking up the chip.
    #[clap(long)]
    chip_description_path: Option<PathBuf>,
    /// Format of the file: bin or hex. Taken from the file extension if omitted.
    #[clap(long)]
    format: Option<Format>,
    /// Address of a binary file. Defaults to the start of the boot region.
    #[clap(long, value_parser = crate::parse_u64)]
    base_address: Option<u64>,
    /// Number of bytes to skip at the start of a binary file.
    #[clap(long, default_value_t = 0)]
    skip: u32,
    /// Read the flash back after programming.
    #[clap(long)]
    verify: bool,
    /// Erase the whole region instead of the touched sectors.
    #[clap(long)]
    chip_erase: bool,
    /// Program page by page through a single buffer.
    #[clap(long)]
    disable_double_buffering: bool,
    /// The file to download.
    path: PathBuf,
}

impl Cmd {
    pub fn run(self) -> anyhow::Result<()> {
        if let Some(path) = &self.chip_description_path {
            let family = stubflash::config::add_target_from_yaml(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            tracing::info!("Added family {} from {}", family, path.display());
        }

        let target = stubflash::config::get_target_by_name(&self.chip)?;
        let names = routine_names(&target);

        let mut session = Session::attach(FakeCore::with_flash_emulation(&target), target);
        for warning in session.fixup_warnings() {
            tracing::warn!("{}", warning);
        }

        let pages = Rc::new(Cell::new(0usize));
        let progress = {
            let pages = pages.clone();
            FlashProgress::new(move |event| {
                if let ProgressEvent::PageProgrammed { .. } = event {
                    pages.set(pages.get() + 1);
                }
            })
        };

        let options = DownloadOptions {
            progress: Some(progress),
            do_chip_erase: self.chip_erase,
            enable_double_buffering: !self.disable_double_buffering,
            verify: self.verify,
            ..Default::default()
        };

        download_file_with_options(&mut session, &self.path, self.format(), options)?;

        let core = session.into_core();
        let mut output = std::io::stdout().lock();

        for call in core.calls() {
            let name = names
                .get(&(call.pc as u64))
                .map(String::as_str)
                .unwrap_or("unknown");
            writeln!(
                output,
                "{:<28} r0={:#010x} r1={:#010x} r2={:#010x}",
                name, call.args[0], call.args[1], call.args[2]
            )?;
        }

        let writes = core
            .trace()
            .iter()
            .filter(|event| matches!(event, TraceEvent::MemoryWrite { .. }))
            .count();

        writeln!(
            output,
            "{} routine calls, {} pages programmed, {} host writes",
            core.calls().len(),
            pages.get(),
            writes
        )?;

        Ok(())
    }

    fn format(&self) -> Format {
        let options = BinOptions {
            base_address: self.base_address,
            skip: self.skip,
        };

        match &self.format {
            Some(Format::Hex) => Format::Hex,
            Some(Format::Bin(_)) => Format::Bin(options),
            None => match self.path.extension().and_then(|e| e.to_str()) {
                Some(extension) if extension.eq_ignore_ascii_case("hex") => Format::Hex,
                _ => Format::Bin(options),
            },
        }
    }
}

/// Maps entry addresses to `algorithm::routine`.
fn routine_names(target: &Target) -> HashMap<u64, String> {
    let mut names = HashMap::new();

    for raw in &target.flash_algorithms {
        let routines = [
            ("init", raw.pc_init),
            ("uninit", raw.pc_uninit),
            ("program_page", Some(raw.pc_program_page)),
            ("erase_sector", raw.pc_erase_sector),
            ("erase_all", raw.pc_erase_all),
        ];

        for (routine, offset) in routines {
            if let Some(offset) = RawFlashAlgorithm::entry_point(offset) {
                names.insert(
                    raw.entry_address(offset),
                    format!("{}::{}", raw.name, routine),
                );
            }
        }
    }

    names
}
