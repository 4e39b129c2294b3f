use std::{error::Error, process, sync::mpsc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden::{
    cli::{Cli, parse_args},
    supervisor::{InitParams, Supervisor},
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let mut supervisor = match Supervisor::init(InitParams::new(&args.config)) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!("Failed to initialize supervisor: {err}");
            process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })?;

    info!("wardend running; interrupt to stop");
    let _ = shutdown_rx.recv();

    supervisor.shutdown()?;
    info!("wardend stopped");
    Ok(())
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
