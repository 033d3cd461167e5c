use crate::config::ModelSource;
use crate::error::AppError;
use crate::models::classify_types::{ClassifyOutcome, ModelStatus, Notification};
use crate::services::classifier::model_manager::{LoadReporter, ModelManager};
use crate::services::image_service;
use tauri::{AppHandle, Emitter, State};

/// Forwards load progress to the webview as `model-status` and
/// `download-progress` events.
pub struct EventReporter<'a> {
    app: &'a AppHandle,
}

impl<'a> EventReporter<'a> {
    pub fn new(app: &'a AppHandle) -> Self {
        Self { app }
    }
}

impl LoadReporter for EventReporter<'_> {
    fn status(&self, status: ModelStatus) {
        let _ = self.app.emit("model-status", status);
    }

    fn progress(&self, percent: u64) {
        let _ = self.app.emit("download-progress", percent);
    }
}

#[tauri::command]
pub async fn get_model_status(
    model_manager: State<'_, ModelManager>,
) -> Result<ModelStatus, AppError> {
    Ok(model_manager.status().await)
}

#[tauri::command]
pub async fn load_model(
    app: AppHandle,
    model_manager: State<'_, ModelManager>,
    source: State<'_, ModelSource>,
) -> Result<(), AppError> {
    model_manager
        .load_model(&source, &EventReporter::new(&app))
        .await
}

/// Pending load-failure notice, handed out once.
#[tauri::command]
pub async fn take_notification(
    model_manager: State<'_, ModelManager>,
) -> Result<Option<Notification>, AppError> {
    Ok(model_manager.take_notification().await)
}

#[tauri::command]
pub async fn classify_image(
    model_manager: State<'_, ModelManager>,
    data_url: String,
) -> Result<ClassifyOutcome, AppError> {
    // Register the upload before decoding so a slower, older upload can't win.
    let request_id = model_manager.begin_request();

    let image = tokio::task::spawn_blocking(move || image_service::decode_data_url(&data_url))
        .await
        .map_err(|e| AppError::Decode(format!("Task join failed: {}", e)))?
        .map_err(|e| {
            log::warn!("Upload {} could not be decoded: {}", request_id, e);
            e
        })?;

    model_manager.classify_request(request_id, image).await
}

#[tauri::command]
pub async fn get_banner(
    model_manager: State<'_, ModelManager>,
) -> Result<Option<Notification>, AppError> {
    Ok(model_manager.banner().await)
}
