use crate::config::{RegisterFixup, Target};
use crate::core::CoreInterface;
use crate::error::Error;
use crate::flashing::FlashError;

/// A post-connect register write which failed.
///
/// These never abort a session, they are only reported.
#[derive(Debug, thiserror::Error)]
#[error("Post-connect write {fixup} failed")]
pub struct FixupWarning {
    /// The write which failed.
    pub fixup: RegisterFixup,
    /// The error reported by the core.
    #[source]
    pub source: Error,
}

/// The flash algorithm currently loaded into target RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResidentAlgorithm {
    pub(crate) name: String,
    /// Operation code passed to `init()`, if the algorithm is initialized.
    pub(crate) initialized: Option<u32>,
}

/// The `Session` struct represents an active debug session with a single
/// core of a target.
///
/// It owns the core, so only one flashing operation can run at a time. The
/// session also remembers which flash algorithm is loaded into RAM and whether
/// it is initialized, so a second algorithm cannot clobber one that still
/// holds the flash controller.
#[derive(Debug)]
pub struct Session<C: CoreInterface> {
    core: C,
    target: Target,
    post_connect_done: bool,
    fixup_warnings: Vec<FixupWarning>,
    resident: Option<ResidentAlgorithm>,
}

impl<C: CoreInterface> Session<C> {
    /// Opens a session on `core` and applies the post-connect register
    /// writes of `target`.
    ///
    /// Failed writes are logged and kept, see [`Session::fixup_warnings`].
    pub fn attach(core: C, target: Target) -> Self {
        let mut session = Self::new(core, target);
        session.post_connect();
        session
    }

    /// Opens a session without touching the target.
    pub fn new(core: C, target: Target) -> Self {
        tracing::debug!("Opening session for {}", target.name);

        Self {
            core,
            target,
            post_connect_done: false,
            fixup_warnings: Vec::new(),
            resident: None,
        }
    }

    /// Applies the post-connect register writes of the target.
    ///
    /// The writes run only once per session, later calls return the warnings
    /// collected by the first one.
    pub fn post_connect(&mut self) -> &[FixupWarning] {
        if !self.post_connect_done {
            self.post_connect_done = true;

            for fixup in &self.target.post_connect {
                tracing::debug!("Post-connect write {}", fixup);

                if let Err(source) = self.core.write_word_32(fixup.address, fixup.value) {
                    tracing::warn!("Post-connect write {} failed: {}", fixup, source);
                    self.fixup_warnings.push(FixupWarning {
                        fixup: fixup.clone(),
                        source,
                    });
                }
            }

            if let Err(error) = self.core.flush() {
                tracing::warn!("Flushing post-connect writes failed: {}", error);
            }
        }

        &self.fixup_warnings
    }

    /// Warnings from the post-connect writes.
    pub fn fixup_warnings(&self) -> &[FixupWarning] {
        &self.fixup_warnings
    }

    /// The core of the session.
    pub fn core(&mut self) -> &mut C {
        &mut self.core
    }

    /// The target of the session.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Ends the session and returns the core.
    pub fn into_core(self) -> C {
        self.core
    }

    /// Name of the flash algorithm currently loaded into RAM, if any.
    pub fn resident_flash_algorithm(&self) -> Option<&str> {
        self.resident.as_ref().map(|resident| resident.name.as_str())
    }

    /// Forgets the resident flash algorithm.
    ///
    /// This is needed after a failed operation left an algorithm initialized,
    /// before another algorithm can be loaded.
    pub fn release_flash_algorithm(&mut self) {
        if let Some(resident) = self.resident.take() {
            tracing::debug!("Releasing flash algorithm {}", resident.name);
        }
    }

    /// Checks that the algorithm `name` may be loaded into RAM.
    pub(crate) fn check_can_load(&self, name: &str) -> Result<(), FlashError> {
        match &self.resident {
            Some(resident) if resident.name != name && resident.initialized.is_some() => {
                Err(FlashError::AlgorithmStillActive {
                    resident: resident.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn set_resident(&mut self, name: &str) {
        self.resident = Some(ResidentAlgorithm {
            name: name.to_string(),
            initialized: None,
        });
    }

    /// Operation the resident algorithm was initialized for.
    pub(crate) fn initialized_operation(&self) -> Option<u32> {
        self.resident.as_ref().and_then(|r| r.initialized)
    }

    pub(crate) fn set_initialized(&mut self, operation: Option<u32>) {
        if let Some(resident) = &mut self.resident {
            resident.initialized = operation;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Registry;
    use crate::probe::fake_core::{FakeCore, TraceEvent};
    use crate::MemoryInterface;
    use pretty_assertions::assert_eq;

    fn target() -> Target {
        Registry::from_builtin_families()
            .get_target_by_name("HC32F4A0xG")
            .unwrap()
    }

    fn written_words(core: &FakeCore) -> Vec<u64> {
        core.trace()
            .iter()
            .filter_map(|event| match event {
                TraceEvent::MemoryWrite { address, .. } => Some(*address),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fixups_are_written_on_attach() {
        let session = Session::attach(FakeCore::new(), target());

        assert!(session.fixup_warnings().is_empty());

        let mut core = session.into_core();
        assert_eq!(
            written_words(&core),
            vec![0xE004_2020, 0xE004_2028, 0xE004_2024]
        );
        assert_eq!(core.read_word_32(0xE004_2020).unwrap(), 0x7F_FFFF);
        assert_eq!(core.read_word_32(0xE004_2028).unwrap(), 0xFFF);
        assert_eq!(core.read_word_32(0xE004_2024).unwrap(), 0x0);
    }

    #[test]
    fn fixups_run_once() {
        let mut session = Session::attach(FakeCore::new(), target());
        session.post_connect();
        session.post_connect();

        assert_eq!(written_words(&session.into_core()).len(), 3);
    }

    #[test]
    fn failing_fixup_becomes_warning() {
        let mut core = FakeCore::new();
        core.fail_writes_to(0xE004_2028);

        let session = Session::attach(core, target());

        let warnings = session.fixup_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].fixup.address, 0xE004_2028);

        // The remaining writes still happen.
        assert_eq!(
            written_words(&session.into_core()),
            vec![0xE004_2020, 0xE004_2024]
        );
    }

    #[test]
    fn other_algorithm_cannot_replace_initialized_one() {
        let mut session = Session::new(FakeCore::new(), target());

        session.set_resident("hc32f4a0_flash");
        assert!(session.check_can_load("hc32f4a0_otp").is_ok());

        session.set_initialized(Some(2));
        assert!(matches!(
            session.check_can_load("hc32f4a0_otp"),
            Err(FlashError::AlgorithmStillActive { resident }) if resident == "hc32f4a0_flash"
        ));
        assert!(session.check_can_load("hc32f4a0_flash").is_ok());

        session.release_flash_algorithm();
        assert!(session.check_can_load("hc32f4a0_otp").is_ok());
        assert_eq!(session.resident_flash_algorithm(), None);
    }
}
