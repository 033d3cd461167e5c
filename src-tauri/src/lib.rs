mod commands;
mod config;
mod error;
mod models;
mod services;

use config::AppConfig;
use services::classifier::model_manager::ModelManager;
use tauri::Manager;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        .plugin(tauri_plugin_window_state::Builder::default().build())
        .setup(|app| {
            let config_dir = app.path().app_config_dir().ok();
            let config = AppConfig::load(config_dir.as_deref())?;

            let resource_dir = app.path().resource_dir().ok();
            let source = config.model_source(resource_dir.as_deref());

            let model_manager = ModelManager::new(&config);
            app.manage(model_manager.clone());
            app.manage(source.clone());

            // Load the model in the background; the UI shows a spinner until it's ready
            let app_handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let reporter = commands::classifier::EventReporter::new(&app_handle);
                if let Err(e) = model_manager.load_model(&source, &reporter).await {
                    log::warn!("Model unavailable at startup: {}", e);
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::classifier::get_model_status,
            commands::classifier::load_model,
            commands::classifier::take_notification,
            commands::classifier::classify_image,
            commands::classifier::get_banner,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
