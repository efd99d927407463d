use stubflash::config::MemoryRegion;

#[derive(clap::Parser)]
pub struct Cmd {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Subcommand)]
/// Inspect internal registry of supported chips
enum Subcommand {
    /// Lists all the available families and their chips.
    #[clap(name = "list")]
    List,
    /// Shows chip properties of a specific chip
    #[clap(name = "info")]
    Info {
        /// The name of the chip to display.
        name: String,
    },
}

impl Cmd {
    pub fn run(self) -> anyhow::Result<()> {
        let output = std::io::stdout().lock();

        match self.subcommand {
            Subcommand::List => print_families(output),
            Subcommand::Info { name } => print_chip_info(output, &name),
        }
    }
}

/// Print all the available families and their contained chips to the
/// commandline.
pub fn print_families(mut output: impl std::io::Write) -> anyhow::Result<()> {
    writeln!(output, "Available chips:")?;
    for family in stubflash::config::families() {
        writeln!(output, "{}", &family.name)?;
        writeln!(output, "    Variants:")?;
        for variant in family.variants() {
            writeln!(output, "        {}", variant.name)?;
        }
    }
    Ok(())
}

/// Print the memory map, flash algorithms and post-connect writes of a chip.
pub fn print_chip_info(mut output: impl std::io::Write, name: &str) -> anyhow::Result<()> {
    writeln!(output, "{}", name)?;
    let target = stubflash::config::get_target_by_name(name)?;

    fn kib(range: &std::ops::Range<u64>) -> f64 {
        (range.end - range.start) as f64 / 1024.0
    }

    for memory in &target.memory_map {
        match memory {
            MemoryRegion::Ram(region) => writeln!(
                output,
                "RAM: {:#010x?} ({:.2} KiB)",
                &region.range,
                kib(&region.range)
            )?,
            MemoryRegion::Nvm(region) => writeln!(
                output,
                "NVM: {:#010x?} ({:.2} KiB, page {:#x}, sector {:#x}, algorithm {})",
                &region.range,
                kib(&region.range),
                region.page_size,
                region.sector_size,
                region.algorithm.as_deref().unwrap_or("none")
            )?,
        };
    }

    writeln!(output, "Post-connect writes ({}):", target.post_connect.len())?;
    for fixup in &target.post_connect {
        writeln!(output, "    - {}", fixup)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_chip_output() {
        let mut buff = Vec::new();
        print_chip_info(&mut buff, "HC32F4A0xI").unwrap();

        // output should be valid utf8
        let output = String::from_utf8(buff).unwrap();

        assert!(output.starts_with("HC32F4A0xI\n"));
        assert!(output.contains("NVM: 0x00000000..0x00200000 (2048.00 KiB"));
        assert!(output.contains("algorithm hc32f4a0_otp"));
        assert!(output.contains("Post-connect writes (3):"));
    }

    #[test]
    fn unknown_chip_output() {
        let mut buff = Vec::new();
        assert!(print_chip_info(&mut buff, "HC32F460").is_err());
    }

    #[test]
    fn families_list_variants() {
        let mut buff = Vec::new();
        print_families(&mut buff).unwrap();

        let output = String::from_utf8(buff).unwrap();
        assert!(output.contains("        HC32F4A0xG\n"));
        assert!(output.contains("        HC32F4A0xI\n"));
    }
}
