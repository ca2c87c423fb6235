//! Get command - download URLs as one stack and write their bodies to disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

use fetchstack::logging::{default_log_file, init_logging};
use fetchstack::{Download, DownloadDelegate, DownloadManager, ManagerConfig, TransportError};

use super::output::{describe_success, output_path};
use crate::error::CliError;

/// Stack name used when `--stack` is not given.
pub const DEFAULT_STACK_NAME: &str = "cli";

/// Arguments for the get command.
pub struct GetArgs {
    pub urls: Vec<String>,
    pub stack: String,
    pub queue: bool,
    pub output_dir: Option<PathBuf>,
    pub max_active: Option<usize>,
    pub timeout: Option<u64>,
    pub config: Option<PathBuf>,
    pub log_dir: PathBuf,
}

/// How a get run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every download settled; `failed` of them did not succeed.
    Completed { failed: usize },
    /// The user interrupted the run.
    Cancelled,
}

enum Event {
    StackFinished,
    Interrupted,
}

/// Prints each settled download and writes successful bodies.
struct ConsoleDelegate {
    output_dir: Option<PathBuf>,
    failed: AtomicUsize,
    events: mpsc::UnboundedSender<Event>,
}

impl ConsoleDelegate {
    fn save(&self, dir: &Path, download: &Download) -> std::io::Result<PathBuf> {
        let index = download.context::<usize>().map_or(0, |i| *i);
        let path = output_path(dir, index, download);
        fs::write(&path, download.data())?;
        Ok(path)
    }
}

impl DownloadDelegate for ConsoleDelegate {
    fn download_did_finish(&self, download: &Download) {
        println!("{}", describe_success(download));

        if let Some(dir) = &self.output_dir {
            match self.save(dir, download) {
                Ok(path) => info!(url = %download.url(), path = %path.display(), "Saved body"),
                Err(e) => {
                    eprintln!("  could not save {}: {}", download.url(), e);
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn download_did_fail(&self, download: &Download, error: &TransportError) {
        eprintln!("[ERR] {}  {}", download.url(), error);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn stack_did_finish(&self, _manager: &DownloadManager, stack_name: &str) {
        info!(stack = %stack_name, "Stack finished");
        let _ = self.events.send(Event::StackFinished);
    }
}

/// Merge CLI overrides into the loaded configuration.
fn resolve_config(args: &GetArgs) -> Result<ManagerConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => ManagerConfig::load_from(path)?,
        None => ManagerConfig::load()?,
    };

    match args.max_active {
        Some(0) => config = config.with_unlimited_downloads(),
        Some(max) => config = config.with_max_active_downloads(max),
        None => {}
    }

    if let Some(secs) = args.timeout {
        config.transport = config
            .transport
            .with_timeout(Duration::from_secs(secs.max(1)));
    }

    Ok(config)
}

/// Run the get command.
pub fn run(args: GetArgs) -> Result<Outcome, CliError> {
    let _logging_guard = init_logging(&args.log_dir, default_log_file())
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let config = resolve_config(&args)?;

    // Reject bad URLs before anything is sent.
    let downloads = args
        .urls
        .iter()
        .enumerate()
        .map(|(i, url)| Download::from_url_str_with_context(url, i + 1))
        .collect::<Result<Vec<_>, _>>()?;
    let total = downloads.len();

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).map_err(|error| CliError::OutputDir {
            path: dir.clone(),
            error,
        })?;
    }

    let runtime = Runtime::new().map_err(CliError::Runtime)?;
    let manager = DownloadManager::with_reqwest(&config, runtime.handle().clone())?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let delegate = Arc::new(ConsoleDelegate {
        output_dir: args.output_dir.clone(),
        failed: AtomicUsize::new(0),
        events: events_tx.clone(),
    });

    {
        let manager = manager.clone();
        let stack = args.stack.clone();
        ctrlc::set_handler(move || {
            manager.cancel_stack(&stack);
            let _ = events_tx.send(Event::Interrupted);
        })
        .map_err(|e| CliError::Signal(e.to_string()))?;
    }

    info!(
        stack = %args.stack,
        downloads = total,
        max_active = ?manager.max_active_downloads(),
        "Starting downloads"
    );
    let start = Instant::now();

    if args.queue {
        for download in downloads {
            manager.add_to_queue(download, &args.stack)?;
        }
        manager.perform_queue(&args.stack, &delegate)?;
    } else {
        manager.perform_downloads(downloads, &delegate, &args.stack)?;
    }

    let event = runtime.block_on(events_rx.recv());

    match event {
        Some(Event::StackFinished) => {
            let failed = delegate.failed.load(Ordering::Relaxed);
            println!();
            println!(
                "{} of {} downloads succeeded in {:.2}s",
                total - failed.min(total),
                total,
                start.elapsed().as_secs_f64()
            );
            Ok(Outcome::Completed { failed })
        }
        Some(Event::Interrupted) | None => {
            warn!(stack = %args.stack, "Interrupted, stack cancelled");
            eprintln!();
            eprintln!("Interrupted.");
            Ok(Outcome::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args_with(config: Option<PathBuf>) -> GetArgs {
        GetArgs {
            urls: vec!["https://example.com/a".to_string()],
            stack: DEFAULT_STACK_NAME.to_string(),
            queue: false,
            output_dir: None,
            max_active: None,
            timeout: None,
            config,
            log_dir: PathBuf::from("logs"),
        }
    }

    #[test]
    fn test_resolve_config_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "[download]\nmax_active = 3\n").unwrap();

        let config = resolve_config(&args_with(Some(path))).unwrap();
        assert_eq!(config.max_active_downloads, Some(3));
    }

    #[test]
    fn test_resolve_config_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "[download]\nmax_active = 3\n[http]\ntimeout = 5\n").unwrap();

        let mut args = args_with(Some(path));
        args.max_active = Some(0);
        args.timeout = Some(42);

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.max_active_downloads, None);
        assert_eq!(config.transport.timeout, Duration::from_secs(42));
    }

    #[test]
    fn test_resolve_config_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = resolve_config(&args_with(Some(dir.path().join("absent.ini")))).unwrap();
        assert_eq!(config, ManagerConfig::default());
    }
}
