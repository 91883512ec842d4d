//! `SpeciesNet` classifier run as an external Python process.
//!
//! Each call writes predictions to its own uniquely named JSON file so
//! concurrent invocations never share a path. The file is removed when the
//! call returns, whatever the outcome.

use crate::config::EngineSettings;
use crate::constants::speciesnet::{
    OUTPUT_FILE_PREFIX, POLL_INTERVAL_MS, PROBE_TIMEOUT_SECS, READER_GRACE_MS, STRIPPED_ENV_VARS,
};
use crate::detector::taxonomy::{self, PredictionsFile};
use crate::detector::{Detection, DetectionBackend, DetectionMode};
use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Environment changes applied to one classifier invocation.
///
/// Built right before spawning and applied to the child's [`Command`] only;
/// the parent's environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOverlay {
    /// New `PATH` value.
    pub path: Option<OsString>,
    /// `VIRTUAL_ENV` to set, if a virtualenv is in use.
    pub virtual_env: Option<PathBuf>,
    /// Variables removed from the child environment.
    pub removed: Vec<&'static str>,
}

impl EnvOverlay {
    /// Compute the overlay from the current `PATH`.
    ///
    /// Entries containing any `exclude` fragment (case-insensitive) are
    /// dropped, and `interpreter_dir` is moved to the front.
    pub fn build(
        current_path: Option<&OsStr>,
        interpreter_dir: Option<&Path>,
        exclude: &[String],
        virtual_env: Option<&Path>,
    ) -> Self {
        let exclude: Vec<String> = exclude.iter().map(|e| e.to_lowercase()).collect();
        let mut entries: Vec<PathBuf> = current_path
            .map(|p| std::env::split_paths(p).collect())
            .unwrap_or_default();
        entries.retain(|entry| {
            let lower = entry.to_string_lossy().to_lowercase();
            !exclude.iter().any(|fragment| lower.contains(fragment.as_str()))
        });

        if let Some(dir) = interpreter_dir {
            entries.retain(|entry| entry != dir);
            entries.insert(0, dir.to_path_buf());
        }

        let path = std::env::join_paths(&entries)
            .map_err(|e| warn!("Could not rebuild PATH for classifier: {e}"))
            .ok()
            .or_else(|| current_path.map(OsStr::to_os_string));

        Self {
            path,
            virtual_env: virtual_env.map(Path::to_path_buf),
            removed: STRIPPED_ENV_VARS.to_vec(),
        }
    }

    /// Apply the overlay to a child command.
    pub fn apply(&self, cmd: &mut Command) {
        for key in &self.removed {
            cmd.env_remove(key);
        }
        if let Some(path) = &self.path {
            cmd.env("PATH", path);
        }
        if let Some(venv) = &self.virtual_env {
            cmd.env("VIRTUAL_ENV", venv);
        }
    }
}

/// Interpreter inside a virtualenv for this platform.
fn venv_interpreter(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Captured result of a finished child process.
#[derive(Debug)]
struct ProcessOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Join readers of a killed process, giving up after `grace`.
///
/// A descendant of the killed process can inherit the pipes and keep them
/// open; its readers are detached and exit once it closes them.
fn reap_readers(readers: [Option<JoinHandle<String>>; 2], grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline
        && readers.iter().flatten().any(|h| !h.is_finished())
    {
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }

    let mut detached = 0;
    for handle in readers.into_iter().flatten() {
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            detached += 1;
        }
    }
    detached
}

/// Run `cmd` to completion, killing it if `timeout` elapses.
///
/// A timeout too large to represent as a deadline means no deadline.
fn run_with_timeout(cmd: &mut Command, program: &Path, timeout: Duration) -> Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| Error::BackendLaunch {
        program: program.to_path_buf(),
        source: e,
    })?;

    // Drain pipes concurrently so a chatty child cannot block on a full pipe.
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now().checked_add(timeout);
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            let _ = child.kill();
            let _ = child.wait();
            let detached = reap_readers(
                [stdout, stderr],
                Duration::from_millis(READER_GRACE_MS),
            );
            if detached > 0 {
                warn!(
                    "{} still holds output pipes after kill; detached {detached} reader(s)",
                    program.display()
                );
            }
            return Err(Error::BackendTimeout {
                seconds: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    };

    Ok(ProcessOutput {
        status,
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

/// RAII guard for a per-call prediction file.
struct TempOutput {
    path: PathBuf,
}

impl TempOutput {
    fn create_in(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| Error::OutputDirCreateFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(format!(
            "{OUTPUT_FILE_PREFIX}{}.json",
            Uuid::new_v4().simple()
        ));
        // The classifier creates the file itself.
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempOutput {
    fn drop(&mut self) {
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            warn!(
                "Failed to remove temporary output {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Backend that shells out to the `SpeciesNet` model runner.
#[derive(Debug, Clone)]
pub struct SpeciesNetBackend {
    python: PathBuf,
    virtual_env: Option<PathBuf>,
    module: String,
    path_exclude: Vec<String>,
    work_dir: PathBuf,
    country_code: String,
    batch_size: usize,
    timeout: Duration,
}

impl SpeciesNetBackend {
    /// Create a backend from engine settings.
    pub fn new(settings: &EngineSettings) -> Self {
        let backend = &settings.backend;
        let venv_python = backend
            .venv
            .as_deref()
            .map(|venv| (venv, venv_interpreter(venv)))
            .filter(|(_, python)| python.exists());

        let (python, virtual_env) = match venv_python {
            Some((venv, python)) => (python, Some(venv.to_path_buf())),
            None => {
                if let Some(venv) = &backend.venv {
                    warn!(
                        "No interpreter found in virtualenv {}, using {}",
                        venv.display(),
                        backend.python.display()
                    );
                }
                (backend.python.clone(), None)
            }
        };
        debug!("Using Python executable: {}", python.display());

        Self {
            python,
            virtual_env,
            module: backend.module.clone(),
            path_exclude: backend.path_exclude.clone(),
            work_dir: settings.work_dir(),
            country_code: settings.country_code.clone(),
            batch_size: settings.batch_size,
            timeout: settings.timeout(),
        }
    }

    /// Interpreter that will be launched.
    pub fn python(&self) -> &Path {
        &self.python
    }

    fn base_command(&self) -> Command {
        let interpreter_dir = self.python.parent().filter(|p| !p.as_os_str().is_empty());
        let overlay = EnvOverlay::build(
            std::env::var_os("PATH").as_deref(),
            interpreter_dir,
            &self.path_exclude,
            self.virtual_env.as_deref(),
        );

        let mut cmd = Command::new(&self.python);
        overlay.apply(&mut cmd);
        cmd.arg("-m").arg(&self.module);
        cmd
    }

    fn run_classifier(&self, image_path: &Path, output: &Path) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("--filepaths")
            .arg(image_path)
            .arg("--predictions_json")
            .arg(output)
            .arg("--country")
            .arg(&self.country_code)
            .arg("--batch_size")
            .arg(self.batch_size.to_string());
        debug!("Running command: {cmd:?}");

        let result = run_with_timeout(&mut cmd, &self.python, self.timeout)?;
        debug!("Classifier exit status: {}", result.status);
        if !result.stdout.is_empty() {
            debug!("Classifier stdout: {}", result.stdout);
        }
        if !result.stderr.is_empty() {
            debug!("Classifier stderr: {}", result.stderr);
        }

        if !result.status.success() {
            return Err(Error::BackendFailed {
                status: result.status.to_string(),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl DetectionBackend for SpeciesNetBackend {
    fn mode(&self) -> DetectionMode {
        DetectionMode::SpeciesNet
    }

    fn check_available(&self) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("--help");

        let result = run_with_timeout(&mut cmd, &self.python, Duration::from_secs(PROBE_TIMEOUT_SECS))
            .map_err(|e| Error::BackendUnavailable {
                reason: e.to_string(),
            })?;
        if !result.status.success() {
            return Err(Error::BackendUnavailable {
                reason: format!(
                    "'{} -m {}' exited with {}: {}",
                    self.python.display(),
                    self.module,
                    result.status,
                    result.stderr.trim()
                ),
            });
        }
        info!("SpeciesNet available via {}", self.python.display());
        Ok(())
    }

    fn detect(&self, image_path: &Path) -> Result<Vec<Detection>> {
        debug!("Starting SpeciesNet detection for: {}", image_path.display());

        let output = TempOutput::create_in(&self.work_dir)?;
        self.run_classifier(image_path, output.path())?;

        if !output.path().exists() {
            return Err(Error::BackendOutputMissing {
                path: output.path().to_path_buf(),
            });
        }

        let contents =
            std::fs::read_to_string(output.path()).map_err(|e| Error::BackendOutputRead {
                path: output.path().to_path_buf(),
                source: e,
            })?;
        let predictions: PredictionsFile =
            serde_json::from_str(&contents).map_err(|e| Error::BackendOutputParse {
                path: output.path().to_path_buf(),
                source: e,
            })?;

        let detections = taxonomy::resolve(&predictions, image_path);
        debug!("Parsed detections: {detections:?}");
        Ok(detections)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn joined(paths: &[&str]) -> OsString {
        std::env::join_paths(paths).unwrap()
    }

    #[test]
    fn test_overlay_filters_and_prepends() {
        let current = joined(&["/usr/bin", "/home/u/Miniforge3/bin", "/opt/venv/bin", "/bin"]);
        let overlay = EnvOverlay::build(
            Some(&current),
            Some(Path::new("/opt/venv/bin")),
            &["miniforge3".to_string()],
            Some(Path::new("/opt/venv")),
        );
        let entries: Vec<PathBuf> = std::env::split_paths(overlay.path.as_ref().unwrap()).collect();
        assert_eq!(
            entries,
            vec![
                PathBuf::from("/opt/venv/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin")
            ]
        );
        assert_eq!(overlay.virtual_env, Some(PathBuf::from("/opt/venv")));
        assert!(overlay.removed.contains(&"PYTHONPATH"));
        assert!(overlay.removed.contains(&"PYTHONHOME"));
    }

    #[test]
    fn test_overlay_without_path() {
        let overlay = EnvOverlay::build(None, None, &[], None);
        assert_eq!(overlay.path, Some(OsString::new()));
        assert!(overlay.virtual_env.is_none());
    }

    #[test]
    fn test_overlay_does_not_touch_process_env() {
        let before = std::env::var_os("PATH");
        let mut cmd = Command::new("true");
        EnvOverlay::build(before.as_deref(), Some(Path::new("/x/bin")), &[], None).apply(&mut cmd);
        assert_eq!(std::env::var_os("PATH"), before);
    }

    #[test]
    fn test_venv_interpreter_layout() {
        let python = venv_interpreter(Path::new("venv"));
        if cfg!(windows) {
            assert!(python.ends_with("Scripts/python.exe"));
        } else {
            assert!(python.ends_with("bin/python"));
        }
    }

    #[test]
    fn test_missing_venv_falls_back_to_python() {
        let mut settings = EngineSettings::default();
        settings.backend.venv = Some(PathBuf::from("/definitely/not/a/venv"));
        let backend = SpeciesNetBackend::new(&settings);
        assert_eq!(backend.python(), Path::new("python3"));
        assert!(backend.virtual_env.is_none());
    }

    #[test]
    fn test_temp_output_names_are_unique_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempOutput::create_in(dir.path()).unwrap();
        let b = TempOutput::create_in(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());

        std::fs::write(a.path(), "{}").unwrap();
        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = EngineSettings::default();
        settings.backend.python = PathBuf::from("/nonexistent/python-for-trapcam");
        settings.backend.work_dir = Some(dir.path().to_path_buf());
        let backend = SpeciesNetBackend::new(&settings);

        let err = backend.detect(Path::new("img.jpg")).unwrap_err();
        let message = err.to_string();
        match err {
            Error::BackendLaunch { ref source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
                assert!(message.ends_with(&source.to_string()), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            backend.check_available(),
            Err(Error::BackendUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_unbounded_timeout_runs_to_completion() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo done"]);
        let output = run_with_timeout(&mut cmd, Path::new("sh"), Duration::MAX).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "done");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_does_not_wait_for_pipe_holding_descendant() {
        // The background sleep inherits stdout and outlives the killed shell.
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30 & sleep 30"]);
        let start = Instant::now();
        let err = run_with_timeout(&mut cmd, Path::new("sh"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::BackendTimeout { seconds: 1 }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_reap_readers_joins_finished_threads() {
        let done = Some(std::thread::spawn(String::new));
        let blocked = Some(std::thread::spawn(|| {
            std::thread::sleep(Duration::from_secs(2));
            String::new()
        }));
        assert_eq!(reap_readers([done, None], Duration::from_millis(500)), 0);
        assert_eq!(reap_readers([blocked, None], Duration::from_millis(100)), 1);
    }
}
