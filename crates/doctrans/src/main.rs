use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use doctrans::{
    init_logging, load_config, resolve_api_key, Config, DoctransError, JobStatus,
    RetentionSweeper, TranslationClient, TranslationService,
};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(
    name = "doctrans",
    version,
    about = "Translate text, Word, PDF and ZIP documents through a remote translation service"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate one file and wait for the result
    Translate {
        file: PathBuf,

        /// Target language code, e.g. "es"
        #[arg(long)]
        to: String,

        /// Directory the translated file is copied to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a single retention sweep
    Sweep,
    /// List the languages offered by the translation service
    Languages,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, DoctransError> {
    let config = load_config(&cli.config)?;
    info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Translate { file, to, output } => translate(&config, &file, &to, output.as_deref()),
        Command::Sweep => {
            let report = RetentionSweeper::from_config(&config).sweep_once();
            println!(
                "Deleted {} file(s), removed {} director(ies), freed {} bytes",
                report.files_deleted, report.directories_removed, report.bytes_freed
            );
            for e in &report.errors {
                println!("  error: {}", e);
            }
            Ok(if report.errors.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Languages => {
            let client = TranslationClient::new(&config.translator, resolve_api_key(&config.translator)?)?;
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            for language in rt.block_on(client.languages())? {
                println!("{:<8} {}", language.code, language.name);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn translate(
    config: &Config,
    file: &Path,
    target_language: &str,
    output: Option<&Path>,
) -> Result<ExitCode, DoctransError> {
    let content = std::fs::read(file)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.txt")
        .to_string();

    let client = TranslationClient::new(&config.translator, resolve_api_key(&config.translator)?)?;
    let service = TranslationService::start(config, Arc::new(client))?;
    service.recover()?;
    service.start_retention();

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let queue_shutdown = service.shutdown_flag();
        let installed = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
            queue_shutdown.store(true, Ordering::SeqCst);
        });
        if let Err(e) = installed {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let job_id = service.submit(&content, &name, target_language)?;
    println!("Submitted {} as job {}", name, job_id);

    let mut last_seen: Option<(String, u8)> = None;
    let job = loop {
        if interrupted.load(Ordering::SeqCst) {
            println!("Interrupted; job {} resumes on the next start", job_id);
            service.shutdown();
            return Ok(ExitCode::FAILURE);
        }

        let job = service.status(&job_id)?;
        let seen = (job.step.clone(), job.progress);
        if last_seen.as_ref() != Some(&seen) {
            if job.total_files > 1 {
                println!(
                    "[{:>3}%] {} ({}/{})",
                    job.progress, job.step, job.current, job.total_files
                );
            } else {
                println!("[{:>3}%] {}", job.progress, job.step);
            }
            last_seen = Some(seen);
        }

        if job.is_terminal() {
            break job;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let code = match job.status {
        JobStatus::Completed => {
            let result = service.result_path(&job_id)?;
            match output {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    let file_name = result
                        .file_name()
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from(&job_id));
                    let dest = dir.join(file_name);
                    std::fs::copy(&result, &dest)?;
                    println!("Translated file written to {}", dest.display());
                }
                None => println!("Translated file available at {}", result.display()),
            }
            ExitCode::SUCCESS
        }
        _ => {
            println!(
                "Translation failed: {}",
                job.error.as_deref().unwrap_or("unknown error")
            );
            ExitCode::FAILURE
        }
    };

    service.shutdown();
    Ok(code)
}
