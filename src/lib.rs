mod history;
mod tooling;

use tauri::Manager;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.center();
            }

            if cfg!(debug_assertions) {
                app.handle().plugin(
                    tauri_plugin_log::Builder::default()
                        .level(log::LevelFilter::Info)
                        .level_for("tao", log::LevelFilter::Error)
                        .level_for("winit", log::LevelFilter::Error)
                        .build(),
                )?;
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            tooling::get_runtime_tools_settings,
            tooling::save_runtime_tools_settings,
            tooling::get_runtime_tools_status,
            tooling::pick_song_folder,
            tooling::pick_local_video_file,
            tooling::pick_cookies_file,
            tooling::open_songs_root_dir,
            tooling::open_path_in_file_manager,
            tooling::probe_local_media,
            tooling::install_or_update_managed_ytdlp,
            tooling::install_or_update_managed_ffmpeg,
            tooling::produce_background_video,
            tooling::adjust_background_video,
            history::get_render_history,
            history::delete_render_entry,
            history::clear_render_history
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
