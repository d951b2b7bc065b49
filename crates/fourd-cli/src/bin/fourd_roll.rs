// crates/fourd-cli/src/bin/fourd_roll.rs
//
// Inspects a .4dr Roll container: prints its header and, optionally,
// extracts one frame's geometry/texture blobs to disk. A debugging tool,
// not part of the capture or farm pipeline itself.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use fourd_core::Roll;

#[derive(Parser)]
#[command(name = "fourd-roll")]
struct Args {
    /// Path to a .4dr Roll file.
    path: PathBuf,

    /// Extract this frame's geometry and texture blobs.
    #[arg(long)]
    extract_frame: Option<u64>,

    /// Directory to write extracted blobs into (defaults to the current directory).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    fourd_cli::logging::init(args.debug);

    let bytes = std::fs::read(&args.path).with_context(|| format!("reading {}", args.path.display()))?;
    let roll = Roll::read(bytes)?;

    println!("{}", serde_json::to_string_pretty(&roll.header)?);
    println!("frame_count: {}", roll.frame_count());

    if let Some(frame) = args.extract_frame {
        let (geometry, texture) = roll.get_frame(frame as usize)?;
        let out_dir = args.out_dir.unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&out_dir)?;
        let geometry_path = out_dir.join(format!("frame_{:06}.geom", frame));
        let texture_path = out_dir.join(format!("frame_{:06}.jpg", frame));
        std::fs::write(&geometry_path, geometry)?;
        std::fs::write(&texture_path, texture)?;
        println!("wrote {} and {}", geometry_path.display(), texture_path.display());
    }

    Ok(())
}
