use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tauri::{AppHandle, Runtime};
use tauri_plugin_dialog::{DialogExt, MessageDialogKind};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePicker {
    pub title: &'static str,
    pub filter_name: &'static str,
    pub extensions: &'static [&'static str],
}

pub const FIRMWARE_PICKER: FilePicker = FilePicker {
    title: "Select Firmware Image",
    filter_name: "Image Files",
    extensions: &["img"],
};

pub const SPLASH_PICKER: FilePicker = FilePicker {
    title: "Select Image for Splash Screen",
    filter_name: "Image Files",
    extensions: &["png", "jpg"],
};

/// Modal prompts shown while an action runs. Both calls block until the user
/// dismisses the dialog.
pub trait Dialogs {
    fn pick_file(&self, picker: &FilePicker) -> Option<PathBuf>;
    fn notify(&self, kind: NoticeKind, title: &str, message: &str);
}

pub struct TauriDialogs<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> TauriDialogs<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> Dialogs for TauriDialogs<R> {
    fn pick_file(&self, picker: &FilePicker) -> Option<PathBuf> {
        self.app
            .dialog()
            .file()
            .set_title(picker.title)
            .add_filter(picker.filter_name, picker.extensions)
            .blocking_pick_file()
            .and_then(|file| file.as_path().map(Path::to_path_buf))
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        let kind = match kind {
            NoticeKind::Info => MessageDialogKind::Info,
            NoticeKind::Error => MessageDialogKind::Error,
        };
        let _ = self
            .app
            .dialog()
            .message(message)
            .title(title)
            .kind(kind)
            .blocking_show();
    }
}

/// Stops prompting once `shutting_down` is raised. Notices are logged instead
/// and file pickers resolve as cancelled.
pub struct ShutdownAwareDialogs<D> {
    inner: D,
    shutting_down: Arc<AtomicBool>,
}

impl<D: Dialogs> ShutdownAwareDialogs<D> {
    pub fn new(inner: D, shutting_down: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            shutting_down,
        }
    }

    fn suppressed(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl<D: Dialogs> Dialogs for ShutdownAwareDialogs<D> {
    fn pick_file(&self, picker: &FilePicker) -> Option<PathBuf> {
        if self.suppressed() {
            return None;
        }
        self.inner.pick_file(picker)
    }

    fn notify(&self, kind: NoticeKind, title: &str, message: &str) {
        if self.suppressed() {
            info!(?kind, title, message, "shutting down, dialog skipped");
            return;
        }
        self.inner.notify(kind, title, message);
    }
}
