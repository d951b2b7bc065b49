// crates/fourd-cli/src/bin/fourd_slave.rs
//
// Runs one Slave against a loopback Message Bus. A real deployment puts
// the Slave in its own process talking to the Master over a network
// transport; the spec's Message Bus is specified as in-process only ("Local
// delivery... bypasses framing", spec §4.A) and framing a real transport is
// explicitly out of scope (spec Non-goals). So this binary is a
// single-slave local development harness: it stands up a throwaway
// `MasterBus` of its own, connects itself as the one Slave, and otherwise
// runs exactly the Supervisor loop a networked deployment would.

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use fourd_capture::MasterBus;
use fourd_core::BusMessage;

#[derive(Parser)]
#[command(name = "fourd-slave")]
struct Args {
    /// This slave's name, as it appears in the config's topology map.
    name: String,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();
    fourd_cli::logging::init(args.debug);

    let config = match fourd_cli::Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            std::process::exit(1);
        }
    };

    warn!(
        "no network transport in this build; running {} as a single-process loopback slave",
        args.name
    );
    let loopback = MasterBus::new();
    let bus = loopback.connect_slave(args.name.clone());
    loopback.broadcast(BusMessage::MasterUp);

    let expected = config.expected_cameras(&args.name).to_vec();
    let exit_code = fourd_cli::slave_runtime::run_slave(bus, config.shot_root.clone(), &expected);
    std::process::exit(exit_code);
}
