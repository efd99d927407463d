use crate::config::NvmRegion;
use crate::core::CoreInterface;
use crate::flashing::{DownloadOptions, FlashError, FlashProgress, FlashSector, Flasher};
use crate::Session;

/// Mass-erase the default non-volatile memory of the target.
///
/// Every default region with a flash algorithm is erased with `EraseAll()`,
/// or sector by sector if the algorithm has no such routine. Regions like
/// the OTP area are left alone.
pub fn erase_all<C: CoreInterface>(
    session: &mut Session<C>,
    progress: FlashProgress,
) -> Result<(), FlashError> {
    tracing::debug!("Erasing all...");

    let options = DownloadOptions {
        progress: Some(progress),
        ..Default::default()
    };

    let regions: Vec<NvmRegion> = session
        .target()
        .nvm_regions()
        .filter(|region| region.is_default && region.algorithm.is_some())
        .cloned()
        .collect();

    for region in &regions {
        tracing::debug!(
            "    region: {:#010x?} ({} bytes)",
            region.range,
            region.len()
        );

        let algo = session.target().flash_algorithm_for_region(region)?.clone();
        tracing::debug!("     -- using algorithm: {}", algo.name);

        let mut flasher = Flasher::new(session, &algo, region, &options)?;
        flasher.run_erase_all()?;
    }

    Ok(())
}

/// Erases all sectors touched by the `len` bytes starting at `address`.
///
/// The range has to lie inside a single region. Sectors are erased
/// completely, even if the range covers them only partly.
pub fn erase_sectors<C: CoreInterface>(
    session: &mut Session<C>,
    progress: FlashProgress,
    address: u64,
    len: u64,
) -> Result<(), FlashError> {
    tracing::debug!("Erasing {:#010x?}", address..address + len);

    let region = session.target().select_region(address, len)?.clone();
    let algo = session.target().flash_algorithm_for_region(&region)?.clone();

    let sectors: Vec<FlashSector> = region
        .sectors_in(address..address + len)
        .inspect(|info| {
            tracing::debug!(
                "    sector: {:#010x}-{:#010x} ({} bytes)",
                info.base_address,
                info.base_address + info.size,
                info.size
            )
        })
        .map(|info| FlashSector::new(&info))
        .collect();

    if sectors.is_empty() {
        return Ok(());
    }

    let options = DownloadOptions {
        progress: Some(progress),
        ..Default::default()
    };

    let mut flasher = Flasher::new(session, &algo, &region, &options)?;
    flasher.sector_erase(&sectors)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Registry;
    use crate::probe::fake_core::FakeCore;
    use crate::MemoryInterface;
    use pretty_assertions::assert_eq;

    fn session() -> Session<FakeCore> {
        let target = Registry::from_builtin_families()
            .get_target_by_name("HC32F4A0xG")
            .unwrap();
        let mut core = FakeCore::with_flash_emulation(&target);
        core.write_8(0x1ff0, &[0; 0x20]).unwrap();
        core.write_8(0x0300_0000, &[0; 4]).unwrap();
        Session::attach(core, target)
    }

    #[test]
    fn touched_sectors_are_erased() {
        let mut session = session();

        erase_sectors(&mut session, FlashProgress::default(), 0x2004, 0x10).unwrap();

        let core = session.core();
        assert_eq!(core.memory(0x1ff0, 0x10), vec![0; 0x10]);
        assert_eq!(core.memory(0x2000, 0x10), vec![0xff; 0x10]);
    }

    #[test]
    fn empty_range_erases_nothing() {
        let mut session = session();
        session.core().write_8(0x2100, &[0; 4]).unwrap();

        erase_sectors(&mut session, FlashProgress::default(), 0x2100, 0).unwrap();

        let core = session.core();
        assert_eq!(core.memory(0x2100, 4), vec![0; 4]);
        assert!(core.calls().is_empty());
    }

    #[test]
    fn range_must_stay_in_one_region() {
        let mut session = session();

        assert!(matches!(
            erase_sectors(&mut session, FlashProgress::default(), 0xf_f000, 0x2000),
            Err(FlashError::CrossesRegionBoundary { .. })
        ));
    }

    #[test]
    fn erase_all_skips_otp() {
        let mut session = session();

        erase_all(&mut session, FlashProgress::default()).unwrap();

        let core = session.core();
        assert_eq!(core.memory(0x1ff0, 0x20), vec![0xff; 0x20]);
        assert_eq!(core.memory(0x0300_0000, 4), vec![0; 4]);
    }
}
