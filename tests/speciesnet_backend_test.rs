//! End-to-end tests for the external classifier backend using a scripted
//! stand-in for the Python interpreter.

#![cfg(unix)]
#![allow(unsafe_code, clippy::unwrap_used, clippy::float_cmp)]

use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use trapcam::Error;
use trapcam::config::EngineSettings;
use trapcam::detector::{
    Category, DetectionBackend, DetectionMode, ImageMetadata, SpeciesDetector, SpeciesNetBackend,
};

/// Argument handling shared by all fake interpreters. Sets `$out` and `$img`.
const PARSE_ARGS: &str = r#"
out=""
img=""
while [ $# -gt 0 ]; do
  case "$1" in
    --help) exit 0 ;;
    --predictions_json) out="$2"; shift ;;
    --filepaths) img="$2"; shift ;;
  esac
  shift
done
"#;

struct Fixture {
    dir: TempDir,
    image: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("IMG_0042.JPG");
        image::RgbImage::new(8, 6).save_with_format(&image, image::ImageFormat::Jpeg).unwrap();
        std::fs::create_dir(dir.path().join("work")).unwrap();
        Self { dir, image }
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Write an executable fake interpreter whose body runs after argument parsing.
    fn interpreter(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("bin").join("python");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("#!/bin/sh\n{PARSE_ARGS}\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn settings(&self, python: &Path, timeout_secs: u64) -> EngineSettings {
        let mut settings = EngineSettings::default();
        settings.mode = Some(DetectionMode::SpeciesNet);
        settings.timeout_secs = timeout_secs;
        settings.backend.python = python.to_path_buf();
        settings.backend.work_dir = Some(self.work_dir());
        settings
    }

    fn leftover_outputs(&self) -> usize {
        std::fs::read_dir(self.work_dir()).unwrap().count()
    }
}

fn prediction_json(prediction: &str, score: f64) -> String {
    format!(
        r#"cat > "$out" <<EOF
{{"predictions":[{{"filepath":"$img","prediction":"{prediction}","prediction_score":{score},"prediction_source":"classifier","detections":[{{"bbox":[0.1,0.2,0.3,0.4]}}]}}]}}
EOF"#
    )
}

#[test]
#[serial]
fn test_successful_detection() {
    let fx = Fixture::new();
    let python = fx.interpreter(&prediction_json(
        "abc;Mammalia;Carnivora;Ursidae;Ursus;thibetanus;Asian black bear",
        0.87,
    ));
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));

    let detections = backend.detect(&fx.image).unwrap();
    assert_eq!(detections.len(), 1);
    let bear = &detections[0];
    assert_eq!(bear.common_name, "Ursus thibetanus");
    assert_eq!(bear.scientific_name, "Ursus thibetanus");
    assert_eq!(bear.english_name, "Asian black bear");
    assert_eq!(bear.category, Category::Mammal);
    assert_eq!(bear.confidence, 0.87);
    assert_eq!(bear.bbox, Some([0.1, 0.2, 0.3, 0.4]));
    assert_eq!(fx.leftover_outputs(), 0);
}

#[test]
#[serial]
fn test_detector_outcome_with_metadata() {
    let fx = Fixture::new();
    let python = fx.interpreter(&prediction_json(
        "abc;Aves;Passeriformes;Corvidae;;;",
        0.64,
    ));
    let settings = fx.settings(&python, 30);
    let detector = SpeciesDetector::from_settings(&settings).unwrap();

    let outcome = detector.detect_single(&fx.image);
    assert!(outcome.success, "{:?}", outcome.error_message);
    assert_eq!(outcome.mode, DetectionMode::SpeciesNet);
    assert_eq!(outcome.detections[0].common_name, "Corvidae");
    assert_eq!(outcome.detections[0].category, Category::Bird);
    assert!(matches!(
        outcome.metadata,
        Some(ImageMetadata::Properties {
            width: 8,
            height: 6,
            ..
        })
    ));
    assert!(outcome.processing_time > 0.0);
}

#[test]
#[serial]
fn test_very_large_timeout_still_runs_classifier() {
    let fx = Fixture::new();
    let python = fx.interpreter(&prediction_json("abc;Aves;Passeriformes;Corvidae;;;", 0.64));
    let mut settings = fx.settings(&python, 30);
    settings.set("timeout", &u64::MAX.to_string()).unwrap();
    let detector = SpeciesDetector::from_settings(&settings).unwrap();

    let outcome = detector.detect_single(&fx.image);
    assert!(outcome.success, "{:?}", outcome.error_message);
    assert_eq!(outcome.detections[0].common_name, "Corvidae");
}

#[test]
#[serial]
fn test_check_available() {
    let fx = Fixture::new();
    let python = fx.interpreter("exit 0");
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));
    assert!(backend.check_available().is_ok());

    let broken = fx.dir.path().join("bin").join("missing-python");
    let backend = SpeciesNetBackend::new(&fx.settings(&broken, 30));
    assert!(matches!(
        backend.check_available(),
        Err(Error::BackendUnavailable { .. })
    ));
}

#[test]
#[serial]
fn test_nonzero_exit_reports_stderr() {
    let fx = Fixture::new();
    let python = fx.interpreter("echo 'model weights missing' >&2\nexit 3");
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));

    let err = backend.detect(&fx.image).unwrap_err();
    match err {
        Error::BackendFailed { stderr, .. } => assert_eq!(stderr, "model weights missing"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.leftover_outputs(), 0);
}

#[test]
#[serial]
fn test_timeout_kills_process() {
    let fx = Fixture::new();
    let python = fx.interpreter("exec sleep 30");
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 1));

    let start = std::time::Instant::now();
    let err = backend.detect(&fx.image).unwrap_err();
    assert!(matches!(err, Error::BackendTimeout { seconds: 1 }));
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(fx.leftover_outputs(), 0);
}

#[test]
#[serial]
fn test_missing_output_file() {
    let fx = Fixture::new();
    let python = fx.interpreter("exit 0");
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));

    let err = backend.detect(&fx.image).unwrap_err();
    assert!(matches!(err, Error::BackendOutputMissing { .. }));
}

#[test]
#[serial]
fn test_unparsable_output_is_removed() {
    let fx = Fixture::new();
    let python = fx.interpreter(r#"echo "not json" > "$out""#);
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));

    let err = backend.detect(&fx.image).unwrap_err();
    assert!(matches!(err, Error::BackendOutputParse { .. }));
    assert_eq!(fx.leftover_outputs(), 0);
}

#[test]
#[serial]
fn test_unmatched_record_yields_no_detections() {
    let fx = Fixture::new();
    let python = fx.interpreter(
        r#"echo '{"predictions":[{"filepath":"/elsewhere/OTHER.JPG","prediction":"x;Aves;;;;;","prediction_score":0.9}]}' > "$out""#,
    );
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));
    assert!(backend.detect(&fx.image).unwrap().is_empty());
}

#[test]
#[serial]
fn test_interpreter_environment_is_sanitized() {
    let fx = Fixture::new();
    let python = fx.interpreter(
        r#"echo "${PYTHONPATH:-unset}|$PATH" > "$out.env"
echo '{"predictions":[]}' > "$out""#,
    );
    // SAFETY: serialized with the other subprocess tests; no other thread
    // reads the environment concurrently.
    unsafe {
        std::env::set_var("PYTHONPATH", "/conflicting/site-packages");
    }
    let backend = SpeciesNetBackend::new(&fx.settings(&python, 30));
    let result = backend.detect(&fx.image);
    // SAFETY: as above.
    unsafe {
        std::env::remove_var("PYTHONPATH");
    }
    assert!(result.unwrap().is_empty());

    let env_file = std::fs::read_dir(fx.work_dir())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.to_string_lossy().ends_with(".env"))
        .unwrap();
    let recorded = std::fs::read_to_string(env_file).unwrap();
    let (pythonpath, path) = recorded.trim().split_once('|').unwrap();
    assert_eq!(pythonpath, "unset");
    let bin_dir = python.parent().unwrap().to_string_lossy().into_owned();
    assert!(path.starts_with(&bin_dir), "{path}");
}
