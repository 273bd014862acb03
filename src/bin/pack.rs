use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fwstream::packager::package;

/// Packages a built firmware binary into the firmware catalog layout.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct PackCli {
    /// C header defining FIRMWARE_NAME, FIRMWARE_VERSION_STR and BOARD_VERSION_STR
    #[clap(short = 'm', long)]
    macro_header: PathBuf,
    /// Firmware binary produced by the build
    #[clap(short = 'b', long)]
    bin_file: PathBuf,
    /// Catalog root the image is written to
    #[clap(long, env, default_value = "firmwares")]
    firmware_dir: PathBuf,
    #[clap(long, env, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let cli = PackCli::parse();

    tracing_subscriber::registry()
        .with(cli.log_level)
        .with(fmt::layer())
        .init();

    let packaged = package(&cli.macro_header, &cli.bin_file, &cli.firmware_dir)?;
    println!(
        "Done: {} {} for board {} ({} bytes) -> {}",
        packaged.name,
        packaged.version,
        packaged.board_version,
        packaged.size,
        packaged.descriptor_path.display()
    );
    Ok(())
}
