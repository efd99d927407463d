use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use tracing::Level;

use super::{
    DownloadOptions, FlashAlgorithm, FlashBuilder, FlashError, FlashLayout, FlashPage,
    FlashProgress, FlashSector,
};
use crate::config::{NvmRegion, RawFlashAlgorithm};
use crate::core::{CoreInterface, CoreRegister};
use crate::error::Error;
use crate::session::Session;

/// Timeout for `Init()` and `UnInit()`, they have no timeout of their own.
const INIT_TIMEOUT: Duration = Duration::from_secs(2);
const HALT_TIMEOUT: Duration = Duration::from_millis(100);

/// The operation a flash algorithm is initialized for.
///
/// The code is passed to `Init()` and `UnInit()`.
pub trait Operation {
    /// Operation code.
    fn operation() -> u32;
    /// Name of the operation, for diagnostics.
    fn operation_name() -> &'static str {
        match Self::operation() {
            1 => "Erase",
            2 => "Program",
            3 => "Verify",
            _ => "Unknown Operation",
        }
    }
}

/// Erasing sectors or the whole chip.
pub struct Erase;

impl Operation for Erase {
    fn operation() -> u32 {
        1
    }
}

/// Programming pages.
pub struct Program;

impl Operation for Program {
    fn operation() -> u32 {
        2
    }
}

/// Reading back flash contents.
pub struct Verify;

impl Operation for Verify {
    fn operation() -> u32 {
        3
    }
}

/// A structure to control the flash of an attached microchip.
///
/// Creating it loads the flash algorithm for one region into target RAM.
/// Once constructed it can be used to erase and program that region.
pub struct Flasher<'session, C: CoreInterface> {
    session: &'session mut Session<C>,
    flash_algorithm: FlashAlgorithm,
    region: NvmRegion,
    options: DownloadOptions,
    progress: FlashProgress,
}

impl<'session, C: CoreInterface> Flasher<'session, C> {
    /// Assembles `raw_flash_algorithm` for the target of `session` and loads it.
    ///
    /// Fails with [`FlashError::AlgorithmStillActive`] if another algorithm is
    /// resident and still initialized.
    pub fn new(
        session: &'session mut Session<C>,
        raw_flash_algorithm: &RawFlashAlgorithm,
        region: &NvmRegion,
        options: &DownloadOptions,
    ) -> Result<Self, FlashError> {
        let target = session.target();
        let flash_algorithm = FlashAlgorithm::assemble(
            raw_flash_algorithm,
            &target.memory_map,
            target.instruction_set,
        )?;

        tracing::info!(
            "Using flash algorithm {} for region {:#010x?}",
            flash_algorithm.name,
            region.range
        );

        session.check_can_load(&flash_algorithm.name)?;

        let mut this = Self {
            session,
            flash_algorithm,
            region: region.clone(),
            options: options.clone(),
            progress: options.progress.clone().unwrap_or_default(),
        };

        this.load()?;

        Ok(this)
    }

    /// The assembled flash algorithm.
    pub fn flash_algorithm(&self) -> &FlashAlgorithm {
        &self.flash_algorithm
    }

    /// The region this flasher programs.
    pub fn region(&self) -> &NvmRegion {
        &self.region
    }

    /// True if the algorithm has two page buffers.
    pub fn double_buffering_supported(&self) -> bool {
        self.flash_algorithm.double_buffering_supported()
    }

    /// Writes the algorithm image to RAM.
    ///
    /// Nothing is executed on the target.
    fn load(&mut self) -> Result<(), FlashError> {
        tracing::debug!("Initializing the flash algorithm.");
        let algo = &self.flash_algorithm;
        let core = self.session.core();

        core.halt(HALT_TIMEOUT)?;

        let span = tracing::debug_span!("Loading algorithm into RAM", address = algo.load_address)
            .entered();

        core.write_32(algo.load_address, &algo.instructions)?;

        if algo.zero_init_size > 0 {
            let data_start = algo.load_address + algo.instructions.len() as u64 * 4;
            core.write_8(data_start, &vec![0; algo.zero_init_size as usize])?;
        }

        core.flush()?;

        drop(span);

        if self.options.verify_algorithm_load {
            let mut data = vec![0; algo.instructions.len()];
            core.read_32(algo.load_address, &mut data)?;

            if let Some(offset) = algo
                .instructions
                .iter()
                .zip(data.iter())
                .position(|(original, read_back)| original != read_back)
            {
                let address = algo.load_address + (4 * offset) as u64;
                tracing::error!(
                    "Failed to verify flash algorithm. Data mismatch at address {:#010x}",
                    address
                );
                tracing::error!("Original instruction: {:#010x}", algo.instructions[offset]);
                tracing::error!("Readback instruction: {:#010x}", data[offset]);

                return Err(FlashError::AlgorithmNotLoaded { address });
            }

            tracing::debug!("RAM contents match flashing algo blob.");
        }

        self.session.set_resident(&algo.name);

        Ok(())
    }

    /// Prepares a call sequence for operation `O`.
    ///
    /// `Init()` is not called yet, see [`ActiveFlasher::init`].
    pub fn activate<O: Operation>(&mut self) -> ActiveFlasher<'_, C, O> {
        tracing::debug!("Preparing Flasher for operation {}", O::operation_name());

        ActiveFlasher {
            session: &mut *self.session,
            flash_algorithm: &self.flash_algorithm,
            options: &self.options,
            progress: &self.progress,
            pending: None,
            _operation: PhantomData,
        }
    }

    /// Runs `f` between `Init()` and `UnInit()`.
    ///
    /// If `f` fails, `UnInit()` is skipped and the algorithm stays initialized.
    fn run<O: Operation, T>(
        &mut self,
        f: impl FnOnce(&mut ActiveFlasher<'_, C, O>) -> Result<T, FlashError>,
    ) -> Result<T, FlashError> {
        let mut active = self.activate::<O>();
        active.init()?;
        let r = f(&mut active)?;
        active.uninit()?;
        Ok(r)
    }

    /// Runs `f` in an erase phase.
    pub fn run_erase<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, C, Erase>) -> Result<T, FlashError>,
    {
        self.run(f)
    }

    /// Runs `f` in a program phase.
    pub fn run_program<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, C, Program>) -> Result<T, FlashError>,
    {
        self.run(f)
    }

    /// Runs `f` in a verify phase.
    pub fn run_verify<T, F>(&mut self, f: F) -> Result<T, FlashError>
    where
        F: FnOnce(&mut ActiveFlasher<'_, C, Verify>) -> Result<T, FlashError>,
    {
        self.run(f)
    }

    /// Erases the whole region.
    ///
    /// Uses `EraseAll()` if the algorithm has it, otherwise every sector of
    /// the region is erased.
    pub fn run_erase_all(&mut self) -> Result<(), FlashError> {
        if self.flash_algorithm.pc_erase_all.is_none() {
            tracing::debug!("No EraseAll routine, erasing sector by sector.");
            let sectors: Vec<FlashSector> = self
                .region
                .sectors_in(self.region.range.clone())
                .map(|info| FlashSector::new(&info))
                .collect();
            return self.sector_erase(&sectors);
        }

        self.progress.started_erasing();
        let result = self.run_erase(|active| active.erase_all());

        if result.is_ok() {
            self.progress.finished_erasing();
        } else {
            self.progress.failed_erasing();
        }

        result
    }

    /// Lays out `data` at `address` and programs it, see [`Flasher::program`].
    pub fn program_data(&mut self, address: u64, data: &[u8]) -> Result<FlashLayout, FlashError> {
        let end = address + data.len() as u64;
        if !self.region.range.contains(&address) {
            return Err(FlashError::NoRegion { address });
        }
        if end > self.region.range.end {
            return Err(FlashError::CrossesRegionBoundary {
                start: address,
                end,
            });
        }

        let mut builder = FlashBuilder::new();
        builder.add_data(address, data)?;
        let layout = self.layout(&builder)?;

        self.program(&layout)?;

        Ok(layout)
    }

    pub(super) fn layout(&self, builder: &FlashBuilder) -> Result<FlashLayout, FlashError> {
        builder.build_sectors_and_pages(&self.region, &self.flash_algorithm, self.options.fill_byte)
    }

    /// Program the contents of `flash_layout` to the flash.
    ///
    /// The sectors of the layout are erased first, unless the options ask
    /// for a chip erase or for no erase at all. Afterwards the pages are
    /// programmed and, if requested, read back.
    pub fn program(&mut self, flash_layout: &FlashLayout) -> Result<(), FlashError> {
        tracing::debug!("Starting program procedure.");
        self.progress.initialized(flash_layout.clone());

        if self.options.do_chip_erase {
            self.run_erase_all()?;
        } else if !self.options.skip_erase {
            self.sector_erase(flash_layout.sectors())?;
        }

        tracing::debug!(
            "Double Buffering enabled: {:?}",
            self.options.enable_double_buffering
        );

        if self.double_buffering_supported() && self.options.enable_double_buffering {
            self.program_double_buffer(flash_layout.pages())?;
        } else {
            self.program_simple(flash_layout.pages())?;
        }

        if self.options.verify {
            self.verify(flash_layout.pages())?;
        }

        Ok(())
    }

    /// Perform an erase of all `sectors`.
    pub fn sector_erase(&mut self, sectors: &[FlashSector]) -> Result<(), FlashError> {
        self.progress.started_erasing();

        let mut t = Instant::now();
        let result = self.run_erase(|active| {
            for sector in sectors {
                active.erase_sector(sector.address())?;
                active.progress.sector_erased(sector.size(), t.elapsed());

                t = Instant::now();
            }
            Ok(())
        });

        if result.is_ok() {
            self.progress.finished_erasing();
        } else {
            self.progress.failed_erasing();
        }

        result
    }

    /// Programs the pages one after another through the first buffer.
    fn program_simple(&mut self, pages: &[FlashPage]) -> Result<(), FlashError> {
        self.progress.started_programming();

        let mut t = Instant::now();
        let result = self.run_program(|active| {
            for (index, page) in pages.iter().enumerate() {
                active.program_page(index, page)?;
                active.progress.page_programmed(page.size(), t.elapsed());

                t = Instant::now();
            }
            Ok(())
        });

        if result.is_ok() {
            self.progress.finished_programming();
        } else {
            self.progress.failed_programming();
        }

        result
    }

    /// Flash a program using double buffering.
    ///
    /// This uses two buffers to increase the flash speed.
    /// While the data from one buffer is programmed, the
    /// data for the next page is already downloaded
    /// into the next buffer.
    fn program_double_buffer(&mut self, pages: &[FlashPage]) -> Result<(), FlashError> {
        self.progress.started_programming();

        let mut t = Instant::now();
        let result = self.run_program(|active| {
            let mut outstanding: Option<(usize, &FlashPage)> = None;

            for (index, page) in pages.iter().enumerate() {
                let buffer = index % 2;

                // The buffer of the outstanding call is the other one.
                active.load_page_buffer(page.data(), buffer)?;

                if let Some((previous_index, previous)) = outstanding.take() {
                    active.wait_for_program_page(previous_index, previous.address())?;
                    active.progress.page_programmed(previous.size(), t.elapsed());

                    t = Instant::now();
                }

                active.start_program_page_with_buffer(page.address(), page.size(), buffer)?;
                outstanding = Some((index, page));
            }

            if let Some((previous_index, previous)) = outstanding {
                active.wait_for_program_page(previous_index, previous.address())?;
                active.progress.page_programmed(previous.size(), t.elapsed());
            }

            Ok(())
        });

        if result.is_ok() {
            self.progress.finished_programming();
        } else {
            self.progress.failed_programming();
        }

        result
    }

    /// Reads back all `pages` and compares them with the programmed data.
    fn verify(&mut self, pages: &[FlashPage]) -> Result<(), FlashError> {
        self.progress.started_verifying();

        let result = self.run_verify(|active| {
            for page in pages {
                let mut data = vec![0; page.data().len()];
                active.read_flash(page.address(), &mut data)?;

                if let Some(offset) = data.iter().zip(page.data()).position(|(a, b)| a != b) {
                    return Err(FlashError::VerifyFailed {
                        address: page.address() + offset as u64,
                    });
                }
            }
            Ok(())
        });

        if result.is_ok() {
            self.progress.finished_verifying();
        } else {
            self.progress.failed_verifying();
        }

        result
    }
}

/// Register values of a single routine call.
struct Registers {
    pc: u64,
    r0: Option<u32>,
    r1: Option<u32>,
    r2: Option<u32>,
    r3: Option<u32>,
}

impl Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}({:?}, {:?}, {:?}, {:?})",
            self.pc, self.r0, self.r1, self.r2, self.r3
        )
    }
}

fn into_reg(val: u64) -> Result<u32, FlashError> {
    let reg_value: u32 = val
        .try_into()
        .map_err(|_| FlashError::RegisterValueNotSupported(val))?;

    Ok(reg_value)
}

fn argument_register(
    registers: &'static crate::core::CoreRegisters,
    index: usize,
) -> Result<&'static CoreRegister, FlashError> {
    registers
        .argument_register(index)
        .ok_or(FlashError::Core(Error::UnknownRegister(index as u16)))
}

/// A routine which was started and did not return yet.
#[derive(Clone, Copy)]
struct PendingCall {
    name: &'static str,
    timeout: Duration,
    breakpoint: Option<u64>,
}

/// A loaded flash algorithm, ready to call its routines for operation `O`.
///
/// At most one routine call is outstanding at a time. Dropping the flasher
/// with a call still running halts the core.
pub struct ActiveFlasher<'a, C: CoreInterface, O: Operation> {
    session: &'a mut Session<C>,
    flash_algorithm: &'a FlashAlgorithm,
    options: &'a DownloadOptions,
    progress: &'a FlashProgress,
    pending: Option<PendingCall>,
    _operation: PhantomData<O>,
}

impl<'a, C: CoreInterface, O: Operation> ActiveFlasher<'a, C, O> {
    /// Calls `Init()`.
    ///
    /// Algorithms without an `Init()` routine are marked initialized as well.
    #[tracing::instrument(name = "Call to flash algorithm init", skip(self))]
    pub fn init(&mut self) -> Result<(), FlashError> {
        if self.session.initialized_operation().is_some() {
            return Err(FlashError::InvalidCallSequence { name: "init" });
        }

        let algo = self.flash_algorithm;

        if let Some(pc_init) = algo.pc_init {
            let address = algo.flash_properties.address_range.start;

            let result = self.call_function_and_wait(
                "init",
                &Registers {
                    pc: pc_init,
                    r0: Some(into_reg(address)?),
                    r1: Some(0),
                    r2: Some(O::operation()),
                    r3: None,
                },
                self.options.timeout.unwrap_or(INIT_TIMEOUT),
            )?;

            if result != 0 {
                return Err(FlashError::RoutineCallFailed {
                    name: "init",
                    code: result,
                });
            }
        }

        self.session.set_initialized(Some(O::operation()));

        Ok(())
    }

    /// Calls `UnInit()`.
    ///
    /// Without a preceding [`init`](Self::init) this fails if the algorithm
    /// has an `Init()` routine, and does nothing otherwise.
    pub fn uninit(&mut self) -> Result<(), FlashError> {
        tracing::debug!("Running uninit routine.");
        let algo = self.flash_algorithm;

        let Some(operation) = self.session.initialized_operation() else {
            return if algo.pc_init.is_some() {
                Err(FlashError::UnsupportedOperation("uninit"))
            } else {
                Ok(())
            };
        };

        self.session.set_initialized(None);

        if let Some(pc_uninit) = algo.pc_uninit {
            let result = self.call_function_and_wait(
                "uninit",
                &Registers {
                    pc: pc_uninit,
                    r0: Some(operation),
                    r1: None,
                    r2: None,
                    r3: None,
                },
                self.options.timeout.unwrap_or(INIT_TIMEOUT),
            )?;

            if result != 0 {
                return Err(FlashError::RoutineCallFailed {
                    name: "uninit",
                    code: result,
                });
            }
        }

        Ok(())
    }

    /// Fails if the algorithm needs `Init()` for this operation and did not get it.
    fn ensure_initialized(&self, name: &'static str) -> Result<(), FlashError> {
        if self.flash_algorithm.pc_init.is_some()
            && self.session.initialized_operation() != Some(O::operation())
        {
            return Err(FlashError::InvalidCallSequence { name });
        }
        Ok(())
    }

    fn timeout(&self, default_ms: u32) -> Duration {
        self.options
            .timeout
            .unwrap_or(Duration::from_millis(default_ms as u64))
    }

    fn call_function_and_wait(
        &mut self,
        name: &'static str,
        registers: &Registers,
        timeout: Duration,
    ) -> Result<u32, FlashError> {
        self.call_function(name, registers, timeout)?;
        self.wait_for_completion()
    }

    fn call_function(
        &mut self,
        name: &'static str,
        registers: &Registers,
        timeout: Duration,
    ) -> Result<(), FlashError> {
        tracing::debug!("Calling routine {} {:?}", name, &registers);

        if self.pending.is_some() {
            return Err(FlashError::InvalidCallSequence { name });
        }

        let algo = self.flash_algorithm;
        let core = self.session.core();

        if !core.core_halted()? {
            return Err(FlashError::CoreNotHalted);
        }

        let regs = core.registers();

        let registers = [
            (regs.program_counter(), Some(into_reg(registers.pc)?)),
            (argument_register(regs, 0)?, registers.r0),
            (argument_register(regs, 1)?, registers.r1),
            (argument_register(regs, 2)?, registers.r2),
            (argument_register(regs, 3)?, registers.r3),
            (regs.static_base(), Some(into_reg(algo.static_base)?)),
            (regs.stack_pointer(), Some(into_reg(algo.begin_stack)?)),
            (regs.return_address(), Some(into_reg(algo.return_address())?)),
        ];

        for (description, value) in &registers {
            if let Some(v) = value {
                core.write_core_reg(description.id, *v)?;

                if tracing::enabled!(Level::TRACE) {
                    let value = core.read_core_reg(description.id)?;

                    tracing::trace!(
                        "content of {} {:#x}: 0x{:08x} should be: 0x{:08x}",
                        description.name,
                        description.id.0,
                        value,
                        *v
                    );
                }
            }
        }

        let breakpoint = if algo.has_return_breakpoint {
            None
        } else {
            core.set_hw_breakpoint(algo.load_address)?;
            Some(algo.load_address)
        };

        self.pending = Some(PendingCall {
            name,
            timeout,
            breakpoint,
        });

        // Resume target operation.
        self.session.core().run()?;

        Ok(())
    }

    /// Waits for the outstanding routine call and returns its result.
    ///
    /// On timeout the core is halted and [`FlashError::StubTimeout`] is returned.
    /// The call stays pending until the core is halted and the return
    /// breakpoint is cleared, so a transport error on the way leaves the
    /// cleanup to [`Drop`].
    #[tracing::instrument(skip(self))]
    pub fn wait_for_completion(&mut self) -> Result<u32, FlashError> {
        let Some(pending) = self.pending else {
            return Err(FlashError::InvalidCallSequence {
                name: "wait_for_completion",
            });
        };

        tracing::debug!("Waiting for routine call completion.");
        let poll_interval = self.options.poll_interval;
        let core = self.session.core();

        let start = Instant::now();
        while !core.core_halted()? {
            if start.elapsed() >= pending.timeout {
                tracing::warn!(
                    "Routine {} did not return within {:?}, halting the core.",
                    pending.name,
                    pending.timeout
                );
                core.halt(HALT_TIMEOUT)?;
                if let Some(address) = pending.breakpoint {
                    core.clear_hw_breakpoint(address)?;
                }
                self.pending = None;

                return Err(FlashError::StubTimeout {
                    name: pending.name,
                    timeout: pending.timeout,
                });
            }

            std::thread::sleep(poll_interval);
        }

        if let Some(address) = pending.breakpoint {
            core.clear_hw_breakpoint(address)?;
        }
        self.pending = None;

        let core = self.session.core();
        let result_register = core
            .registers()
            .result_register(0)
            .ok_or(FlashError::Core(Error::UnknownRegister(0)))?;
        let r = core.read_core_reg(result_register.id)?;
        tracing::debug!("Routine {} returned {}", pending.name, r);

        Ok(r)
    }
}

impl<C: CoreInterface, O: Operation> Drop for ActiveFlasher<'_, C, O> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::warn!("Routine {} is still running, halting the core.", pending.name);

            let core = self.session.core();
            if let Err(error) = core.halt(HALT_TIMEOUT) {
                tracing::warn!("Failed to halt the core: {}", error);
            }
            if let Some(address) = pending.breakpoint {
                if let Err(error) = core.clear_hw_breakpoint(address) {
                    tracing::warn!("Failed to clear breakpoint at {:#010x}: {}", address, error);
                }
            }
        }
    }
}

impl<C: CoreInterface> ActiveFlasher<'_, C, Erase> {
    /// Calls `EraseAll()`.
    pub fn erase_all(&mut self) -> Result<(), FlashError> {
        tracing::debug!("Erasing entire chip.");
        self.ensure_initialized("erase_all")?;

        let pc_erase_all = self
            .flash_algorithm
            .pc_erase_all
            .ok_or(FlashError::UnsupportedOperation("erase_all"))?;

        let timeout = self.timeout(self.flash_algorithm.flash_properties.erase_all_timeout);
        let result = self.call_function_and_wait(
            "erase_all",
            &Registers {
                pc: pc_erase_all,
                r0: None,
                r1: None,
                r2: None,
                r3: None,
            },
            timeout,
        )?;

        if result != 0 {
            Err(FlashError::ChipEraseFailed { code: result })
        } else {
            Ok(())
        }
    }

    /// Calls `EraseSector(address)`.
    pub fn erase_sector(&mut self, address: u64) -> Result<(), FlashError> {
        tracing::info!("Erasing sector at address 0x{:08x}", address);
        self.ensure_initialized("erase_sector")?;

        let pc_erase_sector = self
            .flash_algorithm
            .pc_erase_sector
            .ok_or(FlashError::UnsupportedOperation("erase_sector"))?;

        let t1 = Instant::now();
        let timeout = self.timeout(self.flash_algorithm.flash_properties.erase_sector_timeout);
        let result = self.call_function_and_wait(
            "erase_sector",
            &Registers {
                pc: pc_erase_sector,
                r0: Some(into_reg(address)?),
                r1: None,
                r2: None,
                r3: None,
            },
            timeout,
        )?;
        tracing::info!(
            "Done erasing sector. Result is {}. This took {:?}",
            result,
            t1.elapsed()
        );

        if result != 0 {
            Err(FlashError::EraseFailed {
                sector_address: address,
                code: result,
            })
        } else {
            Ok(())
        }
    }
}

impl<C: CoreInterface> ActiveFlasher<'_, C, Program> {
    /// Programs a single page through the first buffer and waits for it.
    pub fn program_page(&mut self, index: usize, page: &FlashPage) -> Result<(), FlashError> {
        let t1 = Instant::now();

        tracing::info!(
            "Flashing page at address {:#010x} with size: {}",
            page.address(),
            page.size()
        );

        self.load_page_buffer(page.data(), 0)?;
        self.start_program_page_with_buffer(page.address(), page.size(), 0)?;
        self.wait_for_program_page(index, page.address())?;

        tracing::info!("Flashing took: {:?}", t1.elapsed());

        Ok(())
    }

    /// Starts `ProgramPage(address, size, buffer)` without waiting for it.
    pub fn start_program_page_with_buffer(
        &mut self,
        address: u64,
        size: u32,
        buffer_number: usize,
    ) -> Result<(), FlashError> {
        self.ensure_initialized("program_page")?;

        let buffer = self.page_buffer(buffer_number)?;
        let timeout = self.timeout(self.flash_algorithm.flash_properties.program_page_timeout);

        self.call_function(
            "program_page",
            &Registers {
                pc: self.flash_algorithm.pc_program_page,
                r0: Some(into_reg(address)?),
                r1: Some(size),
                r2: Some(into_reg(buffer)?),
                r3: None,
            },
            timeout,
        )
    }

    /// Waits for the outstanding `ProgramPage()` call of page `index`.
    pub fn wait_for_program_page(&mut self, index: usize, address: u64) -> Result<(), FlashError> {
        let code = self.wait_for_completion()?;

        if code != 0 {
            return Err(FlashError::ProgramFailed {
                page: index,
                address,
                code,
            });
        }

        Ok(())
    }

    /// Transfers `bytes` into page buffer `buffer_number`.
    pub fn load_page_buffer(&mut self, bytes: &[u8], buffer_number: usize) -> Result<(), FlashError> {
        let address = self.page_buffer(buffer_number)?;

        if bytes.len() > self.flash_algorithm.page_size as usize {
            return Err(FlashError::InvalidPageSize {
                size: bytes.len() as u32,
                min_program_length: self.flash_algorithm.min_program_length,
            });
        }

        let t1 = Instant::now();
        let core = self.session.core();

        if bytes.len() % 4 == 0 {
            let words: Vec<u32> = bytes
                .chunks_exact(std::mem::size_of::<u32>())
                .map(|a| u32::from_le_bytes([a[0], a[1], a[2], a[3]]))
                .collect();
            core.write_32(address, &words)?;
        } else {
            core.write_8(address, bytes)?;
        }
        core.flush()?;

        tracing::debug!(
            "Took {:?} to download {} byte page into ram",
            t1.elapsed(),
            bytes.len()
        );

        Ok(())
    }

    fn page_buffer(&self, buffer_number: usize) -> Result<u64, FlashError> {
        self.flash_algorithm
            .page_buffers
            .get(buffer_number)
            .copied()
            .ok_or_else(|| FlashError::InvalidPageBuffers {
                name: self.flash_algorithm.name.clone(),
                reason: format!("buffer {buffer_number} does not exist"),
            })
    }
}

impl<C: CoreInterface> ActiveFlasher<'_, C, Verify> {
    /// Reads flash contents at `address`.
    pub fn read_flash(&mut self, address: u64, data: &mut [u8]) -> Result<(), FlashError> {
        self.ensure_initialized("verify")?;
        self.session.core().read_8(address, data)?;
        Ok(())
    }
}
