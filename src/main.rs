//! capview CLI - list capture boards, record raw dumps, write snapshots.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use capview::config::{CapviewConfig, SourceKind};
use capview::error::CapviewResult;
use capview::logging::init_logging;
use capview::rendering::save_frame;
use capview::source::{open_source, record_raw};

#[derive(Parser)]
#[command(name = "capview")]
#[command(author, version, about = "Handheld console capture tools", long_about = None)]
struct Cli {
    /// Config file (defaults to $CAPVIEW_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known capture devices on USB
    Devices,

    /// Write landscape PNG snapshots of captured frames
    Dump(DumpArgs),

    /// Record raw bulk transfers for later replay
    Record(RecordArgs),

    /// Write the effective config as JSON
    InitConfig {
        /// Destination file
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Device,
    Replay,
    Pattern,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Device => SourceKind::Device,
            SourceArg::Replay => SourceKind::Replay,
            SourceArg::Pattern => SourceKind::Pattern,
        }
    }
}

#[derive(Args)]
struct DumpArgs {
    /// Where frames come from
    #[arg(long, value_enum, default_value = "device")]
    source: SourceArg,

    /// Raw dump to read for `--source replay`
    #[arg(long)]
    input: Option<PathBuf>,

    /// Number of frames to write
    #[arg(long, default_value_t = 1)]
    frames: u64,

    /// Output directory
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args)]
struct RecordArgs {
    /// Output file
    #[arg(long)]
    out: PathBuf,

    /// Number of 16 KiB transfers to record
    #[arg(long, default_value_t = 600)]
    chunks: usize,
}

fn main() -> CapviewResult<()> {
    let cli = Cli::parse();
    let config = CapviewConfig::load(cli.config.as_deref())?;
    init_logging(&config.log)?;

    match cli.command {
        Commands::Devices => devices(),
        Commands::Dump(args) => dump(config, args),
        Commands::Record(args) => record(&config, args),
        Commands::InitConfig { out } => {
            config.save(&out)?;
            println!("Wrote {}", out.display());
            Ok(())
        },
    }
}

fn devices() -> CapviewResult<()> {
    let devices = capview_katsukity::scan()?;
    if devices.is_empty() {
        println!("No capture devices found");
        return Ok(());
    }
    for device in devices {
        println!(
            "{:04x}:{:04x}  bus {:03} addr {:03}  {}{}",
            device.known.vendor_id,
            device.known.product_id,
            device.bus,
            device.address,
            device.known.name,
            if device.known.supported { "" } else { " (unsupported)" }
        );
    }
    Ok(())
}

fn dump(mut config: CapviewConfig, args: DumpArgs) -> CapviewResult<()> {
    config.source.kind = args.source.into();
    config.source.replay_loop = false;
    config.source.frame_rate = 0;
    if args.input.is_some() {
        config.source.replay_path = args.input;
    }
    if matches!(config.source.kind, SourceKind::Pattern) {
        config.source.pattern_frames = Some(args.frames);
    }

    std::fs::create_dir_all(&args.out)?;
    let mut source = open_source(&config)?;
    let mut written = 0;
    while written < args.frames {
        let Some(frame) = source.next_frame()? else {
            log::warn!("Source ended after {} frames", written);
            break;
        };
        let [top, bottom] = save_frame(&frame, written, &args.out)?;
        println!("{}  {}", top.display(), bottom.display());
        written += 1;
    }
    Ok(())
}

fn record(config: &CapviewConfig, args: RecordArgs) -> CapviewResult<()> {
    let bytes = record_raw(&config.capture, &args.out, args.chunks)?;
    println!("Recorded {} bytes to {}", bytes, args.out.display());
    Ok(())
}
