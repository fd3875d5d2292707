use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use phison_core::{FirmwareUpdater, PhisonDevice, ToolConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Phison USB controller tool (Pure Rust)", long_about = None)]
struct Args {
    /// TOML file with device selection
    #[arg(long)]
    config: Option<PathBuf>,

    /// USB vendor ID (overrides config)
    #[arg(long, value_parser = parse_u16)]
    vid: Option<u16>,

    /// USB product ID (overrides config)
    #[arg(long, value_parser = parse_u16)]
    pid: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show chip type, chip id, firmware version and mode
    Info,
    /// Show the current run mode
    Mode,
    /// Show the number of LBAs
    Lbas,
    /// Read one XRAM byte
    ReadXram {
        #[arg(value_parser = parse_u16)]
        address: u16,
    },
    /// Write one XRAM byte
    WriteXram {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_u8)]
        value: u8,
    },
    /// Read one IRAM byte
    ReadIram {
        #[arg(value_parser = parse_u8)]
        address: u8,
    },
    /// Write one IRAM byte
    WriteIram {
        #[arg(value_parser = parse_u8)]
        address: u8,
        #[arg(value_parser = parse_u8)]
        value: u8,
    },
    /// Read NAND blocks (512 bytes each) into a file
    ReadNand {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_u16)]
        count: u16,
        output: PathBuf,
    },
    /// Dump XRAM 0x0000-0xEFFF into a file
    DumpXram { output: PathBuf },
    /// Dump the firmware into a file
    DumpFirmware { output: PathBuf },
    /// Load an image into PRAM and run it
    Execute { image: PathBuf },
    /// Submit a password
    Password { password: String },
    /// Flash a firmware image
    SendFirmware {
        firmware: PathBuf,
        /// Burner image, needed unless the device already runs one
        #[arg(long)]
        burner: Option<PathBuf>,
    },
    /// Jump to code loaded in PRAM
    JumpPram,
    /// Reboot into boot mode
    JumpBoot,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_u32(s)?).map_err(|_| format!("'{}' does not fit in 16 bits", s))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    u8::try_from(parse_u32(s)?).map_err(|_| format!("'{}' does not fit in 8 bits", s))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ToolConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ToolConfig::default(),
    };
    if let Some(vid) = args.vid {
        config.vendor_id = vid;
    }
    if args.pid.is_some() {
        config.product_id = args.pid;
    }

    let transport = config.open()?;
    info!(
        vid = %format!("{:04X}", transport.vendor_id()),
        pid = %format!("{:04X}", transport.product_id()),
        "Device connected"
    );
    let mut device = PhisonDevice::new(transport);

    match args.command {
        Commands::Info => println!("{}", device.get_info()?),
        Commands::Mode => println!("{}", device.get_run_mode()?),
        Commands::Lbas => println!("{}", device.get_num_lbas()?),
        Commands::ReadXram { address } => {
            println!("{:04X}: {:02X}", address, device.read_xram(address)?)
        }
        Commands::WriteXram { address, value } => device.write_xram(address, value)?,
        Commands::ReadIram { address } => {
            println!("{:02X}: {:02X}", address, device.read_iram(address)?)
        }
        Commands::WriteIram { address, value } => device.write_iram(address, value)?,
        Commands::ReadNand {
            address,
            count,
            output,
        } => {
            let data = device.read_nand(address, count)?;
            std::fs::write(&output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(bytes = data.len(), path = %output.display(), "NAND read");
        }
        Commands::DumpXram { output } => {
            let data = device.dump_xram()?;
            std::fs::write(&output, &data)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(bytes = data.len(), path = %output.display(), "XRAM dumped");
        }
        Commands::DumpFirmware { output } => device.dump_firmware_to(&output)?,
        Commands::Execute { image } => {
            FirmwareUpdater::new(&mut device).execute_image_file(&image)?;
            info!(mode = %device.get_run_mode()?, "Image started");
        }
        Commands::Password { password } => device.send_password(password.as_bytes())?,
        Commands::SendFirmware { firmware, burner } => {
            let mode = FirmwareUpdater::new(&mut device).send_firmware_files(firmware, burner)?;
            println!("Mode: {}", mode);
        }
        Commands::JumpPram => device.jump_to_pram()?,
        Commands::JumpBoot => device.jump_to_bootmode()?,
    }

    Ok(())
}
