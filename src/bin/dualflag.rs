//! Thin CLI over the dual-boot selector library.
//!
//! All decisions live in the library; this binary parses arguments, enforces
//! the board guard, opens the devices, and maps each error kind to its stable
//! exit code.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::debug;

use dualflag::locate::{self, PartitionTable, SysfsPartitionTable};
use dualflag::metadata::{self, FirmwareInfo};
use dualflag::selector::BootSelector;
use dualflag::{Error, SUPPORTED_BOARD, Slot};

const BOARD_NAME_PATH: &str = "/tmp/sysinfo/board_name";

#[derive(Parser)]
#[command(about = "Dual-boot firmware slot selection for the NBG6817")]
struct Cli {
    /// Print machine-readable JSON where applicable.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Verify the selector region matches a known-good layout
    CheckIntegrity,
    /// Print the block device holding the selector region
    SelectorDevice,
    /// Print the root filesystem device of the active slot
    ActiveRoot,
    /// Describe the firmware in the slot rooted at the given device
    Version { root: PathBuf },
    /// Describe the firmware in both slots
    List,
    /// Mark the slot rooted at the given device active (one-byte write)
    SetActiveRoot { root: PathBuf },
    /// Rewrite the whole selector region, then mark the slot rooted at the
    /// given device active. Dangerous: an interrupted rewrite corrupts the
    /// region.
    ResetAndSetActiveRoot { root: PathBuf },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("dualflag: {err}");
        process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    check_board()?;
    let table = SysfsPartitionTable::new();

    match &cli.cmd {
        Cmd::CheckIntegrity => {
            let slot = open_selector(&table, false)?.check_integrity()?;
            println!("selector region valid, flag layout {slot:?}");
        }
        Cmd::SelectorDevice => {
            println!("{}", locate::selector_device(&table)?.display());
        }
        Cmd::ActiveRoot => {
            let slot = open_selector(&table, false)?.read_active_slot()?;
            println!("{}", slot.root_device());
        }
        Cmd::Version { root } => {
            let slot = Slot::from_root_device(root)?;
            let info = describe(slot, &open_selector(&table, false)?)?;
            print_info(cli, &info)?;
        }
        Cmd::List => {
            let selector = open_selector(&table, false)?;
            for slot in Slot::ALL {
                print_info(cli, &describe(slot, &selector)?)?;
            }
        }
        Cmd::SetActiveRoot { root } => {
            let slot = validate_target(root)?;
            open_selector(&table, true)?.set_active_slot(slot)?;
            println!("active root is now {}", slot.root_device());
        }
        Cmd::ResetAndSetActiveRoot { root } => {
            let slot = validate_target(root)?;
            open_selector(&table, true)?.reset_and_set_active_slot(slot)?;
            println!("selector region reset, active root is now {}", slot.root_device());
        }
    }
    Ok(())
}

/// Refuse to run on anything but the supported board.
fn check_board() -> Result<(), Error> {
    let found = fs::read_to_string(BOARD_NAME_PATH)?.trim().to_string();
    if found == SUPPORTED_BOARD {
        Ok(())
    } else {
        Err(Error::WrongBoard {
            found,
            expected: SUPPORTED_BOARD.to_string(),
        })
    }
}

/// A root device argument must name a known slot and be a live block device.
fn validate_target(root: &Path) -> Result<Slot, Error> {
    let slot = Slot::from_root_device(root)?;
    locate::ensure_block_device(root)?;
    Ok(slot)
}

fn open_selector(
    table: &impl PartitionTable,
    writable: bool,
) -> Result<BootSelector<File>, Error> {
    let path = locate::selector_device(table)?;
    debug!("selector region at {}", path.display());
    let device = OpenOptions::new()
        .read(true)
        .write(writable)
        .open(&path)?;
    Ok(BootSelector::new(device))
}

fn describe(slot: Slot, selector: &BootSelector<File>) -> Result<FirmwareInfo, Error> {
    let header = File::open(slot.header_device())?;
    let kernel = File::open(slot.kernel_device())?;
    metadata::describe(slot, &header, &kernel, selector)
}

fn print_info(cli: &Cli, info: &FirmwareInfo) -> Result<(), Error> {
    if cli.json {
        let rendered = serde_json::to_string_pretty(info)
            .map_err(|err| Error::Io(err.into()))?;
        println!("{rendered}");
    } else {
        let marker = if info.active { " (active)" } else { "" };
        println!("slot {:?}{marker}", info.slot);
        println!("  root:             {}", info.root_device);
        println!("  firmware version: {}", info.firmware_version);
        println!("  kernel version:   {}", info.kernel_version);
        println!("  uname release:    {}", info.uname_version);
    }
    Ok(())
}
