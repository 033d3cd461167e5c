use crate::config::{is_remote, AppConfig, InputLayout, ModelSource};
use crate::error::AppError;
use crate::models::classify_types::{
    ClassifyOutcome, ModelMetadata, ModelState, ModelStatus, Notification, Prediction,
    ProbabilityPair,
};
use crate::services::classifier::decision::{self, LOAD_FAILED_MESSAGE};
use crate::services::classifier::inference::{self, ImageModel};
use futures::StreamExt;
use image::DynamicImage;
use ort::session::Session;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// Upper bound on what a Content-Length header may pre-allocate.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

pub type SharedModel = Arc<std::sync::Mutex<Option<Box<dyn ImageModel>>>>;

/// Receives status changes and download progress while a model loads.
pub trait LoadReporter: Send + Sync {
    fn status(&self, status: ModelStatus);
    fn progress(&self, percent: u64);
}

/// Owns the loaded model and the UI-facing state around it.
#[derive(Clone)]
pub struct ModelManager {
    model: SharedModel,
    metadata: Arc<Mutex<Option<ModelMetadata>>>,
    state: Arc<Mutex<ModelState>>,
    loading: Arc<AtomicBool>,
    latest_request: Arc<AtomicU64>,
    banner: Arc<Mutex<Option<Notification>>>,
    // Load failure not yet shown; survives until the webview asks for it.
    pending_notice: Arc<Mutex<Option<Notification>>>,
    layout: InputLayout,
    use_gpu: bool,
    intra_threads: usize,
}

impl ModelManager {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            model: Arc::new(std::sync::Mutex::new(None)),
            metadata: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(ModelState::Loading)),
            loading: Arc::new(AtomicBool::new(false)),
            latest_request: Arc::new(AtomicU64::new(0)),
            banner: Arc::new(Mutex::new(None)),
            pending_notice: Arc::new(Mutex::new(None)),
            layout: config.input_layout,
            use_gpu: config.use_gpu,
            intra_threads: config.intra_threads.max(1),
        }
    }

    pub async fn state(&self) -> ModelState {
        self.state.lock().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        *self.state.lock().await == ModelState::Ready
    }

    pub async fn status(&self) -> ModelStatus {
        let state = self.state().await;
        let metadata = self.metadata.lock().await.clone();
        ModelStatus {
            loading: state == ModelState::Loading,
            ready: state == ModelState::Ready,
            error: match state {
                ModelState::Error(msg) => Some(msg),
                _ => None,
            },
            model_name: metadata.as_ref().and_then(|m| m.model_name.clone()),
            labels: metadata.map(|m| m.labels).unwrap_or_default(),
        }
    }

    pub async fn banner(&self) -> Option<Notification> {
        self.banner.lock().await.clone()
    }

    /// Hands out the pending load-failure notice once.
    pub async fn take_notification(&self) -> Option<Notification> {
        self.pending_notice.lock().await.take()
    }

    /// Loads metadata then the model. A failure leaves the manager in
    /// `ModelState::Error` with a pending notice until the next successful call.
    /// A call made while another load runs is rejected without touching state.
    pub async fn load_model(
        &self,
        source: &ModelSource,
        reporter: &dyn LoadReporter,
    ) -> Result<(), AppError> {
        if self.is_ready().await {
            reporter.status(self.status().await);
            return Ok(());
        }

        if self.loading.swap(true, Ordering::AcqRel) {
            return Err(AppError::AlreadyLoading);
        }

        *self.pending_notice.lock().await = None;
        *self.state.lock().await = ModelState::Loading;
        reporter.status(self.status().await);
        log::info!("Loading model from {} (metadata {})", source.model, source.metadata);

        let result = self.do_load_model(source, reporter).await;

        if let Err(ref e) = result {
            log::error!("Error initializing model: {}", e);
            *self.state.lock().await = ModelState::Error(e.to_string());
            *self.pending_notice.lock().await = Some(Notification::error(LOAD_FAILED_MESSAGE));
        }

        self.loading.store(false, Ordering::Release);
        reporter.status(self.status().await);
        result
    }

    async fn do_load_model(
        &self,
        source: &ModelSource,
        reporter: &dyn LoadReporter,
    ) -> Result<(), AppError> {
        let metadata_bytes = fetch_bytes(&source.metadata, &|_| {}).await?;
        let metadata = parse_metadata(&metadata_bytes)?;

        let model_bytes = fetch_bytes(&source.model, &|p| reporter.progress(p)).await?;
        let use_gpu = self.use_gpu;
        let intra_threads = self.intra_threads;

        let session = tokio::task::spawn_blocking(move || {
            build_session(&model_bytes, use_gpu, intra_threads)
        })
        .await
        .map_err(|e| AppError::ModelLoad(format!("Failed to spawn model loading task: {}", e)))??;

        self.install(Box::new(session), metadata).await
    }

    /// Puts a ready model in place and marks the manager ready.
    pub async fn install(
        &self,
        model: Box<dyn ImageModel>,
        metadata: ModelMetadata,
    ) -> Result<(), AppError> {
        log::info!(
            "Model ready: {} ({} labels, {}px input)",
            metadata.model_name.as_deref().unwrap_or("unnamed"),
            metadata.labels.len(),
            metadata.image_size
        );

        *self
            .model
            .lock()
            .map_err(|_| AppError::ModelLoad("Model lock poisoned".to_string()))? = Some(model);
        *self.metadata.lock().await = Some(metadata);
        *self.state.lock().await = ModelState::Ready;
        Ok(())
    }

    /// Marks a new upload as the most recent one and returns its id.
    pub fn begin_request(&self) -> u64 {
        self.latest_request.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_latest(&self, request_id: u64) -> bool {
        self.latest_request.load(Ordering::Acquire) == request_id
    }

    /// Runs a prediction for an upload registered with `begin_request`.
    pub async fn classify_request(
        &self,
        request_id: u64,
        image: DynamicImage,
    ) -> Result<ClassifyOutcome, AppError> {
        if !self.is_ready().await {
            return Err(AppError::NotReady);
        }

        let metadata = self.metadata.lock().await.clone().ok_or(AppError::NotReady)?;
        let shared = self.model.clone();
        let layout = self.layout;
        let (width, height) = (image.width(), image.height());

        let predictions = tokio::task::spawn_blocking(move || {
            let mut guard = shared
                .lock()
                .map_err(|_| AppError::Inference("Model lock poisoned".to_string()))?;
            let model = guard.as_mut().ok_or(AppError::NotReady)?;
            inference::classify_with_model(model.as_mut(), &image, &metadata, layout)
        })
        .await
        .map_err(|e| AppError::Inference(format!("Task join failed: {}", e)))??;

        let scores: Vec<f32> = predictions.iter().map(|p| p.probability).collect();
        let probabilities = ProbabilityPair::from_scores(&scores)?;

        Ok(self
            .finish_request(request_id, width, height, predictions, probabilities)
            .await)
    }
    async fn finish_request(
        &self,
        request_id: u64,
        width: u32,
        height: u32,
        predictions: Vec<Prediction>,
        probabilities: ProbabilityPair,
    ) -> ClassifyOutcome {
        let verdict = decision::decide(probabilities);

        // Hold the banner lock while checking so a newer result can't slip in between.
        let mut banner = self.banner.lock().await;
        let superseded = !self.is_latest(request_id);
        let notification = if superseded { None } else { verdict.notification() };

        if superseded {
            log::debug!("Prediction {} superseded by a newer upload", request_id);
        } else if let Some(ref note) = notification {
            *banner = Some(note.clone());
        }

        log::info!(
            "Prediction {}: {:?} (not full {:.3}, full {:.3})",
            request_id,
            verdict,
            probabilities.not_full,
            probabilities.full
        );

        ClassifyOutcome {
            request_id,
            width,
            height,
            predictions,
            probabilities,
            verdict,
            notification,
            superseded,
        }
    }
}

pub fn parse_metadata(bytes: &[u8]) -> Result<ModelMetadata, AppError> {
    let metadata: ModelMetadata = serde_json::from_slice(bytes)
        .map_err(|e| AppError::ModelLoad(format!("Failed to parse model metadata: {}", e)))?;

    if metadata.labels.len() < 2 {
        return Err(AppError::ModelLoad(format!(
            "Model metadata needs 2 labels, found {}",
            metadata.labels.len()
        )));
    }
    if metadata.image_size == 0 {
        return Err(AppError::ModelLoad("Model metadata has imageSize 0".to_string()));
    }

    Ok(metadata)
}

fn build_session(
    model_bytes: &[u8],
    use_gpu: bool,
    intra_threads: usize,
) -> Result<Session, AppError> {
    let _ = ort::init().with_name("trashcan").commit();

    let mut builder = Session::builder()
        .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
        .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(intra_threads)
        .map_err(|e| AppError::ModelLoad(format!("Failed to set intra threads: {}", e)))?;

    if use_gpu {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::DirectMLExecutionProvider::default().build(),
                ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ort::execution_providers::CUDAExecutionProvider::default().build(),
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| {
                AppError::ModelLoad(format!("Failed to register GPU execution providers: {}", e))
            })?;
    } else {
        builder = builder
            .with_execution_providers([
                ort::execution_providers::CPUExecutionProvider::default().build(),
            ])
            .map_err(|e| {
                AppError::ModelLoad(format!("Failed to register CPU execution provider: {}", e))
            })?;
    }

    builder
        .commit_from_memory(model_bytes)
        .map_err(|e| AppError::ModelLoad(format!("Failed to load ONNX model: {}", e)))
}

/// Reads a local file or streams a remote one, reporting percent progress
/// for remote downloads with a known length.
async fn fetch_bytes(
    location: &str,
    on_progress: &(dyn Fn(u64) + Send + Sync),
) -> Result<Vec<u8>, AppError> {
    if !is_remote(location) {
        return tokio::fs::read(location)
            .await
            .map_err(|e| AppError::ModelLoad(format!("Failed to read {}: {}", location, e)));
    }

    let response = reqwest::Client::new().get(location).send().await?;
    if !response.status().is_success() {
        return Err(AppError::ModelLoad(format!(
            "Failed to download {}: HTTP {}",
            location,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut bytes = Vec::with_capacity(total_size.min(MAX_PREALLOC) as usize);
    let mut stream = response.bytes_stream();
    let mut last_emit = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        bytes.extend_from_slice(&chunk);

        if total_size > 0 {
            let progress = download_percent(bytes.len() as u64, total_size);
            if progress > last_emit {
                on_progress(progress);
                last_emit = progress;
            }
        }
    }
    on_progress(100);

    Ok(bytes)
}

/// Percent of `total` received, clamped for bodies longer than announced.
fn download_percent(received: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (received.saturating_mul(100) / total).min(100)
}
