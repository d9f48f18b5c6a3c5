pub mod app;

use tauri::{AppHandle, Manager, RunEvent};
use tracing::{info, warn};

use app::commands::{
    cancel_background_task, check_device, check_tools, create_splash, flash_firmware, get_config,
    list_background_tasks, run_custom_command,
};
use app::config::load_config;
use app::logging::init_logging;
use app::state::AppState;

/// A missing or unreadable icon only costs the window its icon.
fn apply_window_icon(app: &AppHandle, icon_path: &str) {
    if icon_path.trim().is_empty() {
        return;
    }
    let Some(window) = app.get_webview_window("main") else {
        warn!("main window not found, skipping icon");
        return;
    };
    match tauri::image::Image::from_path(icon_path.trim()) {
        Ok(icon) => {
            if let Err(err) = window.set_icon(icon) {
                warn!(icon_path = %icon_path, error = %err, "Error setting icon");
            }
        }
        Err(err) => warn!(icon_path = %icon_path, error = %err, "Error setting icon"),
    }
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let (config, config_error) = match load_config("startup") {
        Ok(config) => (config, None),
        Err(err) => (Default::default(), Some(err)),
    };
    init_logging(&config.logging.log_level);
    if let Some(err) = config_error {
        warn!(error = %err, "using default configuration");
    }

    let icon_path = config.ui.icon_path.clone();
    let cancel_on_exit = config.tasks.cancel_on_exit;

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_dialog::init())
        .manage(AppState::new())
        .setup(move |app| {
            apply_window_icon(app.handle(), &icon_path);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_config,
            check_tools,
            check_device,
            flash_firmware,
            create_splash,
            run_custom_command,
            list_background_tasks,
            cancel_background_task
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(move |handle, event| match event {
        RunEvent::ExitRequested { api, .. } => {
            let outstanding = handle.state::<AppState>().tasks.begin_shutdown(cancel_on_exit);
            if outstanding > 0 {
                // The event loop keeps running while workers finish so any
                // dialog they already opened can still be dismissed.
                api.prevent_exit();
                info!(outstanding, cancel_on_exit, "waiting for background tasks");
                let handle = handle.clone();
                std::thread::spawn(move || {
                    handle.state::<AppState>().tasks.shutdown(cancel_on_exit);
                    handle.exit(0);
                });
            }
        }
        RunEvent::Exit => {
            let joined = handle.state::<AppState>().tasks.shutdown(cancel_on_exit);
            info!(joined, cancel_on_exit, "exiting");
        }
        _ => {}
    });
}
