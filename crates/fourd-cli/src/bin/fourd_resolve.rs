// crates/fourd-cli/src/bin/fourd_resolve.rs
//
// The resolve entry-point (spec §6): one invocation handles one farm stage
// for one frame. Called by the farm driver once per task, exactly the way
// `original_source/deadline_plugin/4DREC/4DREC.py` calls `launch()` once per
// Deadline task — except across a real process boundary the embedded
// callback becomes a line of JSON per event on stdout (see
// `fourd_resolve::events`), and the exit code carries success/failure for
// the task runner that has no callback to listen on at all.

use std::path::PathBuf;

use clap::Parser;
use uuid::Uuid;

use fourd_core::SubmissionSheet;
use fourd_resolve::{engine_from_env, ResolveCache, ResolveEvent, ResolveStage, WorkerPool};

#[derive(Parser)]
#[command(name = "fourd-resolve")]
struct Args {
    /// Frame number to resolve, shot-relative. -1 for stages that operate
    /// on the whole job rather than one frame (initialize, export).
    #[arg(short = 'f', long, default_value_t = -1)]
    frame: i64,

    #[arg(short = 's', long, value_enum)]
    resolve_stage: ResolveStage,

    #[arg(short = 'l', long)]
    yaml_path: PathBuf,

    /// Extra settings, JSON string format. Accepted for calling-convention
    /// parity with the original plugin; unused by any stage implemented
    /// here.
    #[arg(short = 'e', long)]
    extra_settings: Option<String>,

    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();
    fourd_cli::logging::init(args.debug);

    if let Some(raw) = &args.extra_settings {
        if let Err(e) = serde_json::from_str::<serde_json::Value>(raw) {
            ResolveEvent::Fail { message: format!("malformed --extra_settings: {e}") }.emit();
            std::process::exit(1);
        }
    }

    match run(&args) {
        Ok(()) => {
            ResolveEvent::Complete.emit();
            std::process::exit(0);
        }
        Err(message) => {
            ResolveEvent::Fail { message }.emit();
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let yaml = std::fs::read_to_string(&args.yaml_path)
        .map_err(|e| format!("reading {}: {e}", args.yaml_path.display()))?;
    let sheet: SubmissionSheet = serde_yaml::from_str(&yaml)
        .map_err(|e| format!("parsing {}: {e}", args.yaml_path.display()))?;
    let job_id: Uuid = sheet.job_id.parse().map_err(|e| format!("job_id {:?} is not a uuid: {e}", sheet.job_id))?;

    ResolveEvent::LogInfo { message: format!("stage {} frame {} job {}", args.resolve_stage, args.frame, sheet.job_id) }.emit();

    let engine = engine_from_env();

    match args.resolve_stage {
        ResolveStage::Initialize => {
            engine.initialize(&sheet).map_err(|e| e.to_string())?;
        }
        ResolveStage::Resolve => {
            let cache = ResolveCache::new();
            cache
                .request(job_id, args.frame, sheet.texture_size, || engine.resolve_frame(&sheet, args.frame))
                .map_err(|e| e.to_string())?;
            ResolveEvent::Progress { percent: 100.0 }.emit();
        }
        ResolveStage::Conversion => {
            engine.convert_frame(&sheet, args.frame).map_err(|e| e.to_string())?;
        }
        ResolveStage::Export => {
            let pool = WorkerPool::new(4);
            let dest_dir = PathBuf::from(&sheet.job_path).join("export_4dh");
            fourd_resolve::export_parallel(&pool, (sheet.start_frame, sheet.end_frame), fourd_resolve::ExportFormat::FourDh, &dest_dir, move |frame| {
                engine.resolve_frame(&sheet, frame)
            })
            .map_err(|e| e.to_string())?;
            ResolveEvent::Progress { percent: 100.0 }.emit();
        }
    }

    Ok(())
}
