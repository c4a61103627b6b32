use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logs of this many earlier runs are kept beside the current one
const KEEP_RUNS: usize = 3;

/// `hecon.log` -> `hecon.log.<n>`
fn previous_run(log_path: &Path, n: usize) -> PathBuf {
    let mut name = OsString::from(log_path.as_os_str());
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Move the last run's log to `.1`, `.1` to `.2` and so on. The log past
/// `keep` generations is removed.
fn shift_previous_runs(log_path: &Path, keep: usize) -> io::Result<()> {
    let oldest = previous_run(log_path, keep);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = previous_run(log_path, n);
        if from.exists() {
            fs::rename(&from, previous_run(log_path, n + 1))?;
        }
    }
    if log_path.exists() {
        fs::rename(log_path, previous_run(log_path, 1))?;
    }
    Ok(())
}

/// Initialize logging.
///
/// Without a log file, events go to stderr so stdout stays clean for the
/// rendered response. With one, every run writes a fresh file and the logs
/// of the previous runs move to numbered siblings. `RUST_LOG` overrides
/// `level`.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> color_eyre::Result<()> {
    let default_filter = format!("hecon={level},hecon_core={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let Some(log_path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .try_init()?;
        return Ok(());
    };

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if let Err(e) = shift_previous_runs(log_path, KEEP_RUNS) {
        eprintln!("Warning: could not keep previous run logs: {e}");
    }
    let file = File::create(log_path)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;

    tracing::info!(log_path = %log_path.display(), "hecon logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_previous_run_names() {
        assert_eq!(
            previous_run(Path::new("logs/hecon.log"), 2),
            PathBuf::from("logs/hecon.log.2")
        );
    }

    #[test]
    fn test_runs_shift_and_oldest_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hecon.log");

        for run in 0..5 {
            shift_previous_runs(&path, 3).unwrap();
            fs::write(&path, format!("run {run}\n")).unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "run 4\n");
        assert_eq!(fs::read_to_string(previous_run(&path, 1)).unwrap(), "run 3\n");
        assert_eq!(fs::read_to_string(previous_run(&path, 2)).unwrap(), "run 2\n");
        assert_eq!(fs::read_to_string(previous_run(&path, 3)).unwrap(), "run 1\n");
        assert!(!previous_run(&path, 4).exists());
    }

    #[test]
    fn test_first_run_has_nothing_to_shift() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hecon.log");
        shift_previous_runs(&path, KEEP_RUNS).unwrap();
        assert!(!path.exists());
        assert!(!previous_run(&path, 1).exists());
    }
}
