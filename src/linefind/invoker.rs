//! Line-finder process runner
//!
//! Turns a [`LineFindItem`] into a command line for the external line-finder
//! binary, runs it to completion on the calling thread, and hands back
//! everything the process produced.
//!
//! ## Error States
//!
//! - `Spawn`: binary missing or not executable
//! - `Exit`: process ran but exited non-zero or was killed by a signal
//! - `Timeout`: process exceeded the configured limit and was killed
//! - `Io`: pipe failure while collecting output

use chrono::{DateTime, Utc};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::job::LineFindItem;

/// Binary used when nothing else is configured
pub const DEFAULT_LINE_FINDER: &str = "bin/grime2cli";

/// How often a running child is polled while a timeout is armed
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Output of a line-finder run that exited successfully
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Raw standard output, undecoded
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl Invocation {
    /// Standard output decoded as UTF-8, replacing invalid sequences
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum LineFindError {
    #[error("failed to start line finder {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line finder failed ({reason})")]
    Exit {
        reason: String,
        exit_code: Option<i32>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },

    #[error("line finder timed out after {0:?}")]
    Timeout(Duration),

    #[error("i/o error collecting line finder output: {0}")]
    Io(#[from] io::Error),
}

/// Runs the external line-finder binary
#[derive(Debug, Clone)]
pub struct LineFinder {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for LineFinder {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_FINDER)
    }
}

impl LineFinder {
    /// Create a runner for `binary` with no timeout
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Kill the process if it runs longer than `timeout` (None waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Build the argument list for a job.
    ///
    /// Order is fixed: image, timestamp source, start position, format,
    /// calibration file, result image. The result image argument is always
    /// present, empty when no image was requested.
    pub fn args(job: &LineFindItem) -> Vec<String> {
        vec![
            "--find_line".to_string(),
            job.image_filepath().to_string(),
            job.timestamp_src().flag().to_string(),
            "--timestamp_start_pos".to_string(),
            job.timestamp_start_pos().to_string(),
            "--timestamp_format".to_string(),
            job.timestamp_format().to_string(),
            "--calib_json".to_string(),
            job.calib_filepath().to_string(),
            "--result_image".to_string(),
            job.result_image_filepath().to_string(),
        ]
    }

    /// Build the full command for a job, without running it
    pub fn command(&self, job: &LineFindItem) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(Self::args(job));
        command
    }

    /// Run the line finder for one job and wait for it to finish.
    ///
    /// Blocks the calling thread. Stdout and stderr are drained on helper
    /// threads so a chatty process cannot stall on a full pipe.
    pub fn invoke(&self, job: &LineFindItem) -> Result<Invocation, LineFindError> {
        info!(
            image = job.image_filepath(),
            source = %job.timestamp_src(),
            "running line finder"
        );
        debug!(binary = %self.binary.display(), args = ?Self::args(job), "line finder command");

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = self
            .command(job)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                warn!(
                    binary = %self.binary.display(),
                    error = %source,
                    "could not start line finder"
                );
                LineFindError::Spawn {
                    binary: self.binary.clone(),
                    source,
                }
            })?;

        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        // Readers are left detached on timeout; they finish once the pipes close
        let status = self.wait(&mut child, start)?;

        let stdout = collect(stdout_reader)?;
        let stderr = collect(stderr_reader)?;
        let duration = start.elapsed();

        if !status.success() {
            let reason = describe_exit(status);
            warn!(image = job.image_filepath(), %reason, "line finder failed");
            return Err(LineFindError::Exit {
                reason,
                exit_code: status.code(),
                stdout,
                stderr,
            });
        }

        debug!(
            bytes = stdout.len(),
            elapsed_ms = duration.as_millis() as u64,
            "line finder finished"
        );

        Ok(Invocation {
            stdout,
            stderr,
            exit_code: status.code(),
            started_at,
            duration,
        })
    }

    /// Wait for the child, killing it once the timeout elapses
    fn wait(&self, child: &mut Child, start: Instant) -> Result<ExitStatus, LineFindError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        wait_with_deadline(child, start, timeout, Child::try_wait)
    }
}

/// Poll `child` until it exits or `timeout` has passed since `start`.
/// The child is killed and reaped on every error path.
fn wait_with_deadline(
    child: &mut Child,
    start: Instant,
    timeout: Duration,
    mut poll: impl FnMut(&mut Child) -> io::Result<Option<ExitStatus>>,
) -> Result<ExitStatus, LineFindError> {
    loop {
        match poll(child) {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(child);
                warn!(error = %e, "lost track of line finder, killed");
                return Err(e.into());
            }
        }

        if start.elapsed() >= timeout {
            kill_and_reap(child);
            warn!(?timeout, "line finder timed out, killed");
            return Err(LineFindError::Timeout(timeout));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>, LineFindError> {
    let output = reader
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "output reader panicked"))??;
    Ok(output)
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linefind::job::TimestampSource;

    fn filename_job() -> LineFindItem {
        LineFindItem::new(
            "/data/2012/06/NRmarshDN-12-06-30-10-30.jpg",
            TimestampSource::Filename,
            10,
            "yy-mm-dd-hh-mm",
            "/data/calib.json",
        )
        .with_result_image("/var/tmp/water/find_line_result.png")
    }

    #[test]
    fn test_args_for_filename_timestamp() {
        let args = LineFinder::args(&filename_job());

        assert_eq!(
            args,
            vec![
                "--find_line",
                "/data/2012/06/NRmarshDN-12-06-30-10-30.jpg",
                "--timestamp_from_filename",
                "--timestamp_start_pos",
                "10",
                "--timestamp_format",
                "yy-mm-dd-hh-mm",
                "--calib_json",
                "/data/calib.json",
                "--result_image",
                "/var/tmp/water/find_line_result.png",
            ]
        );
    }

    #[test]
    fn test_args_for_exif_timestamp() {
        let job = LineFindItem::new(
            "/data/2012/06/NRmarshDN-12-06-30-10-30.jpg",
            TimestampSource::Exif,
            0,
            "yy-mm-dd-hh-mm",
            "/data/calib.json",
        );

        let args = LineFinder::args(&job);

        assert!(args.contains(&"--timestamp_from_exif".to_string()));
        assert!(!args.contains(&"--timestamp_from_filename".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(""));
        assert_eq!(args.len(), 11);
    }

    #[test]
    fn test_command_uses_configured_binary() {
        let finder = LineFinder::new("/opt/gauge/bin/grime2cli");
        let command = finder.command(&filename_job());

        assert_eq!(command.get_program(), "/opt/gauge/bin/grime2cli");
        assert_eq!(command.get_args().count(), 11);
        assert_eq!(LineFinder::default().binary(), Path::new(DEFAULT_LINE_FINDER));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::{Mutex, MutexGuard};

        // Writing a script while another test forks can leave it busy for exec
        static PROCESS_LOCK: Mutex<()> = Mutex::new(());

        fn lock() -> MutexGuard<'static, ()> {
            PROCESS_LOCK.lock().unwrap_or_else(|e| e.into_inner())
        }

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("line_finder.sh");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_invoke_captures_stdout() {
            let _guard = lock();
            let job = filename_job();

            let output = LineFinder::new("/bin/echo").invoke(&job).unwrap();

            let expected = format!("{}\n", LineFinder::args(&job).join(" "));
            assert_eq!(output.stdout, expected.into_bytes());
            assert_eq!(output.exit_code, Some(0));
            assert!(output.stderr.is_empty());
        }

        #[test]
        fn test_missing_binary() {
            let _guard = lock();
            let finder = LineFinder::new("/nonexistent/bin/grime2cli");

            match finder.invoke(&filename_job()) {
                Err(LineFindError::Spawn { binary, source }) => {
                    assert_eq!(binary, PathBuf::from("/nonexistent/bin/grime2cli"));
                    assert_eq!(source.kind(), io::ErrorKind::NotFound);
                }
                other => panic!("expected spawn error, got {:?}", other),
            }
        }

        #[test]
        fn test_non_zero_exit_keeps_output() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let binary = script(dir.path(), "echo partial\necho 'bad calib' >&2\nexit 3");

            match LineFinder::new(binary).invoke(&filename_job()) {
                Err(LineFindError::Exit {
                    exit_code,
                    stdout,
                    stderr,
                    ..
                }) => {
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stdout, b"partial\n");
                    assert_eq!(stderr, b"bad calib\n");
                }
                other => panic!("expected exit error, got {:?}", other),
            }
        }

        #[test]
        fn test_timeout_kills_process() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let binary = script(dir.path(), "exec sleep 5");

            let finder = LineFinder::new(binary).with_timeout(Some(Duration::from_millis(200)));
            let start = Instant::now();
            let result = finder.invoke(&filename_job());

            assert!(matches!(result, Err(LineFindError::Timeout(_))));
            assert!(start.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_large_output_does_not_stall() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let binary = script(
                dir.path(),
                "head -c 300000 /dev/zero\nhead -c 100000 /dev/zero >&2",
            );

            let finder = LineFinder::new(binary).with_timeout(Some(Duration::from_secs(30)));
            let output = finder.invoke(&filename_job()).unwrap();

            assert_eq!(output.stdout.len(), 300_000);
            assert_eq!(output.stderr.len(), 100_000);
        }

        #[test]
        fn test_false_reports_exit_code() {
            let _guard = lock();

            match LineFinder::new("/bin/false").invoke(&filename_job()) {
                Err(LineFindError::Exit {
                    reason, exit_code, ..
                }) => {
                    assert_eq!(exit_code, Some(1));
                    assert_eq!(reason, "exit code 1");
                }
                other => panic!("expected exit error, got {:?}", other),
            }
        }

        #[test]
        fn test_signal_termination_has_no_exit_code() {
            let _guard = lock();
            let dir = tempfile::tempdir().unwrap();
            let binary = script(dir.path(), "echo before\nkill -9 $$");

            match LineFinder::new(binary).invoke(&filename_job()) {
                Err(LineFindError::Exit {
                    reason,
                    exit_code,
                    stdout,
                    ..
                }) => {
                    assert_eq!(exit_code, None);
                    assert_eq!(reason, "terminated by signal");
                    assert_eq!(stdout, b"before\n");
                }
                other => panic!("expected exit error, got {:?}", other),
            }
        }

        #[test]
        fn test_poll_error_kills_child() {
            let _guard = lock();
            let mut child = Command::new("sleep")
                .arg("5")
                .stdout(Stdio::null())
                .spawn()
                .unwrap();

            let start = Instant::now();
            let result = wait_with_deadline(&mut child, start, Duration::from_secs(30), |_| {
                Err(io::Error::new(io::ErrorKind::Other, "poll failed"))
            });

            assert!(matches!(result, Err(LineFindError::Io(_))));
            // Already reaped: the cached status is available without blocking
            let status = child.try_wait().unwrap().expect("child should be reaped");
            assert!(!status.success());
            assert!(start.elapsed() < Duration::from_secs(4));
        }
    }
}
