use std::{process, sync::Arc};

use tracing::{error, info, warn};

use topeupdate::{
    cli::parse_args,
    config::load_config,
    downloader::Downloader,
    ingress::Ingress,
    installer::Installer,
    lifecycle::Lifecycle,
    logging,
    reporter::Reporter,
    runtime,
    state::StateManager,
};

fn main() {
    let args = parse_args();

    let mut config = match load_config(Some(&args.config)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config '{}': {err}", args.config);
            process::exit(1);
        }
    };

    if let Some(install_root) = &args.install_root {
        config.install_root = install_root.clone();
    }
    let log_level = args
        .log_level
        .map(|level| level.as_str().to_string())
        .unwrap_or_else(|| config.log_level.clone());

    runtime::init(config.install_root.clone().into());
    if let Err(err) = runtime::bootstrap_directories() {
        eprintln!("failed to create install root directories: {err}");
        process::exit(1);
    }

    if let Err(err) = logging::init(&runtime::log_dir(), &log_level) {
        eprintln!("failed to initialize logging: {err}");
        process::exit(1);
    }

    info!(install_root = %config.install_root, "topeupdated starting");

    let state = Arc::new(StateManager::new(runtime::state_file_path()));
    let reporter = Arc::new(Reporter::new(&config.orchestrator_url));
    let downloader = Arc::new(Downloader::new(
        runtime::tmp_dir(),
        Arc::clone(&state),
        Arc::clone(&reporter),
    ));
    let installer = Arc::new(Installer::new(
        runtime::install_root(),
        config.service_manager.clone(),
        Arc::clone(&state),
        Arc::clone(&reporter),
    ));
    let lifecycle = Arc::new(Lifecycle::new(
        Arc::clone(&state),
        downloader,
        installer,
        runtime::tmp_dir(),
    ));

    lifecycle.self_heal();

    if let Err(err) = ctrlc::set_handler(move || {
        info!("shutdown signal received, exiting");
        process::exit(0);
    }) {
        warn!(error = %err, "failed to register signal handler, continuing without one");
    }

    let ingress = Ingress::new(lifecycle, Arc::clone(&state));
    if let Err(err) = ingress.serve(config.ingress_port) {
        error!(error = %err, "ingress terminated");
        process::exit(1);
    }
}
