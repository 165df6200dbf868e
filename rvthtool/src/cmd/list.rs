use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
};

use argp::FromArgs;
use rvth::{
    nhcd::{BankTable, NHCD_BLOCK_SIZE, NHCD_MAX_BANKS, NHCD_TABLE_LBA},
    Result, ResultContext,
};

#[derive(FromArgs, Debug)]
/// Lists the banks of an RVT-H device image.
#[argp(subcommand, name = "list")]
pub struct Args {
    #[argp(positional)]
    /// path to device image
    file: PathBuf,
}

pub fn run(args: Args) -> Result<()> {
    let mut file =
        File::open(&args.file).with_context(|| format!("Failed to open {}", args.file.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", args.file.display()))?
        .len();
    let dir_offset = NHCD_TABLE_LBA * NHCD_BLOCK_SIZE as u64;
    let mut directory = vec![0u8; (1 + NHCD_MAX_BANKS) * NHCD_BLOCK_SIZE];
    file.seek(SeekFrom::Start(dir_offset))
        .and_then(|_| file.read_exact(&mut directory))
        .with_context(|| format!("Failed to read bank directory from {}", args.file.display()))?;
    let table = BankTable::parse(&directory, len / NHCD_BLOCK_SIZE as u64)?;

    println!("{}:", args.file.display());
    for bank in table.banks() {
        let size_mib = bank.byte_len() / (1024 * 1024);
        if bank.timestamp.is_empty() {
            println!("Bank {}: {}", bank.index + 1, bank.kind);
        } else {
            println!(
                "Bank {}: {} {} {} MiB (LBA {:#x}+{:#x}){}",
                bank.index + 1,
                bank.kind,
                bank.timestamp,
                size_mib,
                bank.lba_start,
                bank.lba_len,
                if bank.usable { "" } else { " [unusable]" }
            );
        }
    }
    Ok(())
}
