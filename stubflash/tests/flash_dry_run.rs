use std::time::Duration;

use pretty_assertions::assert_eq;
use stubflash::config::get_target_by_name;
use stubflash::flashing::{DownloadOptions, FlashError, Flasher};
use stubflash::probe::fake_core::{FakeCore, StubCall, StubOutcome, TraceEvent};
use stubflash::{Error, Session, Target};

const LOAD_ADDRESS: u64 = 0x2000_0000;

const FLASH_INIT: u32 = 0x2000_019d;
const FLASH_UNINIT: u32 = 0x2000_0375;
const FLASH_PROGRAM_PAGE: u32 = 0x2000_0221;
const FLASH_ERASE_SECTOR: u32 = 0x2000_0121;
const OTP_PROGRAM_PAGE: u32 = 0x2000_02d1;

const BUFFERS: [u64; 2] = [0x2000_1000, 0x2000_1800];

fn target() -> Target {
    get_target_by_name("HC32F4A0xG").unwrap()
}

fn session_with(target: Target, setup: impl FnOnce(&mut FakeCore)) -> Session<FakeCore> {
    let mut core = FakeCore::with_flash_emulation(&target);
    setup(&mut core);
    Session::attach(core, target)
}

fn session() -> Session<FakeCore> {
    session_with(target(), |_| {})
}

fn program(
    session: &mut Session<FakeCore>,
    address: u64,
    data: &[u8],
    options: DownloadOptions,
) -> Result<(), FlashError> {
    let mut loader = session.target().flash_loader();
    loader.add_data(address, data)?;
    loader.commit(session, options)
}

fn calls_to(session: &mut Session<FakeCore>, pc: u32) -> Vec<StubCall> {
    session
        .core()
        .calls()
        .iter()
        .filter(|call| call.pc == pc)
        .copied()
        .collect()
}

#[test]
fn payload_is_programmed_page_by_page() {
    let mut session = session();
    let data: Vec<u8> = (0..0x4000u32).map(|i| (i % 251) as u8).collect();

    program(&mut session, 0x0, &data, DownloadOptions::default()).unwrap();

    let calls = calls_to(&mut session, FLASH_PROGRAM_PAGE);
    assert_eq!(
        calls
            .iter()
            .map(|call| (call.args[0], call.args[1], call.args[2]))
            .collect::<Vec<_>>(),
        (0..8)
            .map(|i| (i * 0x800, 0x800, BUFFERS[i as usize % 2] as u32))
            .collect::<Vec<_>>()
    );

    assert_eq!(session.core().memory(0x0, 0x4000), data);
}

#[test]
fn phases_are_initialized_and_uninitialized() {
    let mut session = session();

    program(&mut session, 0x2000, &[0xaa; 0x800], DownloadOptions::default()).unwrap();

    let calls: Vec<(u32, [u32; 4])> = session
        .core()
        .calls()
        .iter()
        .map(|call| (call.pc, call.args))
        .collect();

    assert_eq!(
        calls.iter().map(|(pc, _)| *pc).collect::<Vec<_>>(),
        vec![
            FLASH_INIT,
            FLASH_ERASE_SECTOR,
            FLASH_UNINIT,
            FLASH_INIT,
            FLASH_PROGRAM_PAGE,
            FLASH_UNINIT
        ]
    );

    // Init gets the flash base, clock 0 and the operation.
    assert_eq!(&calls[0].1[..3], &[0x0, 0x0, 1]);
    assert_eq!(calls[1].1[0], 0x2000);
    assert_eq!(calls[2].1[0], 1);
    assert_eq!(&calls[3].1[..3], &[0x0, 0x0, 2]);
    assert_eq!(calls[5].1[0], 2);
}

#[test]
fn next_page_is_written_into_the_free_buffer() {
    let mut session = session();

    program(&mut session, 0x0, &[0x5a; 0x4000], DownloadOptions::default()).unwrap();

    let mut outstanding: Option<u64> = None;
    let mut overlapped_writes = 0;

    for event in session.core().trace() {
        match event {
            TraceEvent::Resume { pc, args } if *pc == FLASH_PROGRAM_PAGE => {
                outstanding = Some(args[2] as u64);
            }
            TraceEvent::StatusPolled { halted: true } => outstanding = None,
            TraceEvent::MemoryWrite {
                address,
                core_running,
                ..
            } if BUFFERS.contains(address) => {
                assert_ne!(Some(*address), outstanding);
                if *core_running {
                    overlapped_writes += 1;
                }
            }
            _ => {}
        }
    }

    // Every page but the first is transferred while the previous one programs.
    assert_eq!(overlapped_writes, 7);
}

#[test]
fn single_buffer_never_writes_while_running() {
    let mut session = session();
    let options = DownloadOptions {
        enable_double_buffering: false,
        ..Default::default()
    };

    program(&mut session, 0x0, &[0x5a; 0x4000], options).unwrap();

    let calls = calls_to(&mut session, FLASH_PROGRAM_PAGE);
    assert_eq!(calls.len(), 8);
    assert!(calls.iter().all(|call| call.args[2] == BUFFERS[0] as u32));

    assert!(session.core().trace().iter().all(|event| !matches!(
        event,
        TraceEvent::MemoryWrite {
            core_running: true,
            ..
        }
    )));
}

#[test]
fn hanging_stub_times_out_and_leaves_core_halted() {
    let mut session = session_with(target(), |core| {
        core.set_stub_handler(|call| (call.pc == FLASH_PROGRAM_PAGE).then_some(StubOutcome::Hang))
    });
    let options = DownloadOptions {
        timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };

    let result = program(&mut session, 0x0, &[0; 0x800], options);

    assert!(matches!(
        result,
        Err(FlashError::StubTimeout {
            name: "program_page",
            ..
        })
    ));
    assert!(session.core().is_halted());
    assert!(matches!(
        session.core().trace().last(),
        Some(TraceEvent::Halt)
    ));
}

#[test]
fn failing_page_keeps_earlier_pages() {
    let mut session = session_with(target(), |core| {
        core.set_stub_handler(|call| {
            (call.pc == FLASH_PROGRAM_PAGE && call.args[0] == 0x1000).then_some(
                StubOutcome::Return {
                    result: 1,
                    polls_until_halt: 0,
                },
            )
        })
    });

    let result = program(&mut session, 0x0, &[0x33; 0x2000], DownloadOptions::default());

    assert!(matches!(
        result,
        Err(FlashError::ProgramFailed {
            page: 2,
            address: 0x1000,
            code: 1
        })
    ));
    assert_eq!(session.core().memory(0x0, 0x1000), vec![0x33; 0x1000]);
    assert_eq!(session.core().memory(0x1000, 0x10), vec![0xff; 0x10]);
    assert!(session.core().is_halted());
}

#[test]
fn uninit_without_init() {
    let mut target = target();
    let region = target.select_region(0x0, 0x800).unwrap().clone();
    let mut session = session_with(target.clone(), |_| {});
    let raw = target.flash_algorithm_for_region(&region).unwrap().clone();

    {
        let mut flasher =
            Flasher::new(&mut session, &raw, &region, &DownloadOptions::default()).unwrap();
        let mut active = flasher.activate::<stubflash::flashing::Erase>();

        assert!(matches!(
            active.uninit(),
            Err(FlashError::UnsupportedOperation("uninit"))
        ));
        assert!(matches!(
            active.erase_sector(0x0),
            Err(FlashError::InvalidCallSequence {
                name: "erase_sector"
            })
        ));
    }
    assert!(session.core().calls().is_empty());

    // Without an init routine, uninit is a no-op.
    for algorithm in &mut target.flash_algorithms {
        algorithm.pc_init = None;
    }
    let raw = target.flash_algorithm_for_region(&region).unwrap().clone();
    let mut session = session_with(target, |_| {});

    {
        let mut flasher =
            Flasher::new(&mut session, &raw, &region, &DownloadOptions::default()).unwrap();
        flasher
            .activate::<stubflash::flashing::Erase>()
            .uninit()
            .unwrap();
    }
    assert!(session.core().calls().is_empty());
}

#[test]
fn image_without_bkpt_uses_hardware_breakpoint() {
    let mut target = target();
    for algorithm in &mut target.flash_algorithms {
        // NOP NOP instead of the leading BKPT.
        algorithm.instructions[0] = 0xbf00_bf00;
    }
    let mut session = session_with(target, |_| {});

    program(&mut session, 0x0, &[0x11; 0x800], DownloadOptions::default()).unwrap();

    let calls = session.core().calls().len();
    let trace = session.core().trace();
    let set = trace
        .iter()
        .filter(|event| **event == TraceEvent::BreakpointSet(LOAD_ADDRESS))
        .count();
    let cleared = trace
        .iter()
        .filter(|event| **event == TraceEvent::BreakpointCleared(LOAD_ADDRESS))
        .count();

    assert_eq!(set, calls);
    assert_eq!(cleared, calls);
    assert!(session.core().breakpoints().is_empty());
    assert_eq!(session.core().memory(0x0, 0x800), vec![0x11; 0x800]);
}

#[test]
fn lost_status_leaves_core_halted() {
    let mut target = target();
    for algorithm in &mut target.flash_algorithms {
        algorithm.instructions[0] = 0xbf00_bf00;
    }
    let mut session = session_with(target, |core| core.fail_status_while_running());

    let result = program(&mut session, 0x0, &[0x11; 0x800], DownloadOptions::default());

    assert!(matches!(result, Err(FlashError::Core(Error::Timeout))));
    let core = session.core();
    assert!(core.is_halted());
    assert!(core.breakpoints().is_empty());
    assert!(matches!(
        core.trace().last(),
        Some(TraceEvent::BreakpointCleared(LOAD_ADDRESS))
    ));
}

#[test]
fn exhausted_breakpoints_are_reported() {
    let mut target = target();
    for algorithm in &mut target.flash_algorithms {
        algorithm.instructions[0] = 0xbf00_bf00;
    }
    let mut session = session_with(target, |core| core.set_breakpoint_units(0));

    let result = program(&mut session, 0x0, &[0x11; 0x800], DownloadOptions::default());

    assert!(matches!(
        result,
        Err(FlashError::Core(Error::BreakpointsExhausted { units: 0 }))
    ));
}

#[test]
fn post_connect_writes_come_first() {
    let mut session = session();

    program(&mut session, 0x0, &[0; 4], DownloadOptions::default()).unwrap();

    let writes: Vec<u64> = session
        .core()
        .trace()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::MemoryWrite { address, .. } => Some(*address),
            _ => None,
        })
        .take(4)
        .collect();

    assert_eq!(
        writes,
        vec![0xE004_2020, 0xE004_2028, 0xE004_2024, LOAD_ADDRESS]
    );
}

#[test]
fn otp_uses_its_own_algorithm() {
    let mut session = session();

    program(&mut session, 0x0300_0000, &[0x42; 0x10], DownloadOptions::default()).unwrap();

    let calls = calls_to(&mut session, OTP_PROGRAM_PAGE);
    assert_eq!(calls.len(), 1);
    assert_eq!(&calls[0].args[..3], &[0x0300_0000, 0x1800, 0x2000_1000]);
    assert!(calls_to(&mut session, FLASH_PROGRAM_PAGE).is_empty());

    assert_eq!(session.core().memory(0x0300_0000, 0x10), vec![0x42; 0x10]);
    assert_eq!(session.resident_flash_algorithm(), Some("hc32f4a0_otp"));
}

#[test]
fn verify_detects_unprogrammed_flash() {
    let mut session = session_with(target(), |core| {
        core.set_stub_handler(|call| {
            (call.pc == FLASH_PROGRAM_PAGE).then_some(StubOutcome::Return {
                result: 0,
                polls_until_halt: 0,
            })
        })
    });
    let options = DownloadOptions {
        verify: true,
        ..Default::default()
    };

    let result = program(&mut session, 0x800, &[0xff, 0xfe], options);

    assert!(matches!(
        result,
        Err(FlashError::VerifyFailed { address: 0x801 })
    ));
}

#[test]
fn verify_passes_after_programming() {
    let mut session = session();
    let options = DownloadOptions {
        verify: true,
        ..Default::default()
    };

    program(&mut session, 0x800, &[1, 2, 3, 4], options).unwrap();
}

#[test]
fn initialized_algorithm_blocks_other_algorithm() {
    let mut session = session_with(target(), |core| {
        core.set_stub_handler(|call| {
            (call.pc == FLASH_PROGRAM_PAGE).then_some(StubOutcome::Return {
                result: 5,
                polls_until_halt: 0,
            })
        })
    });

    assert!(matches!(
        program(&mut session, 0x0, &[0; 4], DownloadOptions::default()),
        Err(FlashError::ProgramFailed { code: 5, .. })
    ));

    assert!(matches!(
        program(&mut session, 0x0300_0000, &[0; 4], DownloadOptions::default()),
        Err(FlashError::AlgorithmStillActive { resident }) if resident == "hc32f4a0_flash"
    ));

    session.release_flash_algorithm();
    program(&mut session, 0x0300_0000, &[0; 4], DownloadOptions::default()).unwrap();
}
