use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::app::config::SplashSettings;
use crate::app::error::AppError;

pub fn splash_output_path(settings: &SplashSettings, base_dir: &Path) -> PathBuf {
    let output_dir = settings.output_dir.trim();
    let dir = if output_dir.is_empty() {
        base_dir.to_path_buf()
    } else {
        let candidate = PathBuf::from(output_dir);
        if candidate.is_absolute() {
            candidate
        } else {
            base_dir.join(candidate)
        }
    };
    dir.join(settings.output_file_name.trim())
}

/// Copies `source` over `destination`, replacing any existing file.
/// Returns the number of bytes staged.
pub fn stage_splash_image(
    source: &Path,
    destination: &Path,
    trace_id: &str,
) -> Result<u64, AppError> {
    if !source.is_file() {
        return Err(AppError::validation(
            format!("{} is not a readable file", source.display()),
            trace_id,
        ));
    }
    if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::system(
                format!("Failed to create {}: {err}", parent.display()),
                trace_id,
            )
        })?;
    }
    // Copying a file onto itself truncates it.
    if let (Ok(from), Ok(to)) = (source.canonicalize(), destination.canonicalize()) {
        if from == to {
            return fs::metadata(&from)
                .map(|meta| meta.len())
                .map_err(|err| AppError::system(err.to_string(), trace_id));
        }
    }
    let bytes = fs::copy(source, destination)
        .map_err(|err| AppError::system(err.to_string(), trace_id))?;
    info!(
        trace_id = %trace_id,
        source = %source.display(),
        destination = %destination.display(),
        bytes,
        "staged splash image"
    );
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_defaults_to_base_dir() {
        let settings = SplashSettings::default();
        assert_eq!(
            splash_output_path(&settings, Path::new("/work")),
            PathBuf::from("/work/custom_splash.img")
        );
    }

    #[test]
    fn output_path_honors_relative_and_absolute_dirs() {
        let mut settings = SplashSettings {
            output_dir: "out".to_string(),
            output_file_name: "logo.img".to_string(),
        };
        assert_eq!(
            splash_output_path(&settings, Path::new("/work")),
            PathBuf::from("/work/out/logo.img")
        );
        settings.output_dir = "/tmp/splash".to_string();
        assert_eq!(
            splash_output_path(&settings, Path::new("/work")),
            PathBuf::from("/tmp/splash/logo.img")
        );
    }

    #[test]
    fn overwrites_existing_splash_without_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("boot.png");
        let destination = dir.path().join("custom_splash.img");
        fs::write(&source, b"new image bytes").expect("write source");
        fs::write(&destination, b"stale contents that are longer").expect("write stale");

        let bytes = stage_splash_image(&source, &destination, "trace").expect("stage");
        assert_eq!(bytes, 15);
        assert_eq!(fs::read(&destination).expect("read"), b"new image bytes");
    }

    #[test]
    fn creates_missing_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("boot.jpg");
        fs::write(&source, b"jpeg").expect("write");
        let destination = dir.path().join("nested/out/custom_splash.img");
        stage_splash_image(&source, &destination, "trace").expect("stage");
        assert!(destination.is_file());
    }

    #[test]
    fn staging_a_file_onto_itself_keeps_its_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom_splash.img");
        fs::write(&path, b"keep me").expect("write");
        let bytes = stage_splash_image(&path, &path, "trace").expect("stage");
        assert_eq!(bytes, 7);
        assert_eq!(fs::read(&path).expect("read"), b"keep me");
    }

    #[test]
    fn missing_source_is_a_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = stage_splash_image(
            &dir.path().join("nope.png"),
            &dir.path().join("custom_splash.img"),
            "trace-7",
        )
        .expect_err("missing source");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert_eq!(err.trace_id, "trace-7");
    }
}
