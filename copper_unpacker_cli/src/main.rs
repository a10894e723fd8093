use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;

use libcopper_unpacker::config::Config;
use libcopper_unpacker::process::{create_subsets, process_subset};
use libcopper_unpacker::summary::Summary;
use libcopper_unpacker::worker_status::{BarColor, WorkerStatus};

fn make_template_config(path: &Path) {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config).unwrap();
    let mut file = File::create(path).expect("Could create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let template = match color {
        BarColor::CYAN => "{prefix} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        BarColor::GREEN => "{prefix} [{bar:40.green/blue}] {pos:>3}% {msg}",
        BarColor::RED => "{prefix} [{bar:40.red/blue}] {pos:>3}% {msg}",
    };
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn update_bar(bar: &ProgressBar, status: &WorkerStatus) {
    bar.set_style(bar_style(&status.color));
    bar.set_position((status.progress * 100.0) as u64);
    bar.set_message(format!("{} records", status.records));
}

fn main() {
    // Create a cli
    let matches = Command::new("copper_unpacker_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .help("Path to the file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    LogWrapper::new(pb_manager.clone(), logger)
        .try_init()
        .expect("Could not create logging/progress!");

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A path must be given with -p/--path");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        log::info!("Done.");
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Input Path: {}", config.input_path.to_string_lossy());
    log::info!("File Pattern: {}", config.file_pattern);
    log::info!("Format: {}", config.format);
    log::info!("Summary Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Check Integrity: {} Stop On Error: {}",
        config.check_integrity,
        config.stop_on_error
    );
    if !config.is_n_threads_valid() {
        log::error!("Number of workers must be at least 1, found {}", config.n_threads);
        return;
    }
    let summary_path = match config.get_summary_file_name() {
        Ok(p) => p,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };

    let subsets = match create_subsets(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if subsets.is_empty() {
        log::error!("No input files matching {} found", config.file_pattern);
        return;
    }

    // Setup the progress bars and spawn the workers!
    let (tx, rx) = channel::<WorkerStatus>();
    let mut bars = Vec::new();
    let mut handles = Vec::new();
    for (worker_id, subset) in subsets.into_iter().enumerate() {
        let bar = pb_manager.add(ProgressBar::new(100));
        bar.set_style(bar_style(&BarColor::CYAN));
        bar.set_prefix(format!("Worker {worker_id}"));
        bars.push(bar);

        let worker_config = config.clone();
        let worker_tx = tx.clone();
        handles.push(std::thread::spawn(move || {
            process_subset(worker_config, worker_tx, worker_id, subset)
        }));
    }
    drop(tx);

    // Ends once every worker has dropped its sender
    for status in rx.iter() {
        if let Some(bar) = bars.get(status.worker_id) {
            update_bar(bar, &status);
        }
    }

    let mut summary = Summary::new(config.format);
    let mut failed = false;
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(worker_summary)) => summary.merge(worker_summary),
            Ok(Err(e)) => {
                log::error!("Worker {worker_id} failed with error: {e}");
                failed = true;
            }
            Err(_) => {
                log::error!("Failed to join worker {worker_id}!");
                failed = true;
            }
        }
    }
    for bar in bars.iter() {
        bar.finish();
    }

    log::info!(
        "Decoded {} records, {} blocks, {} bad blocks from {} files",
        summary.records,
        summary.total_blocks(),
        summary.total_bad_blocks(),
        summary.files.len(),
    );
    match summary.write(&summary_path) {
        Ok(()) => log::info!("Summary written to {}", summary_path.to_string_lossy()),
        Err(e) => log::error!("Failed to write summary: {e}"),
    }

    if failed {
        log::error!("Unpacking did not complete, see the errors above.");
    } else {
        log::info!("Done.");
    }
}
