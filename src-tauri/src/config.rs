use crate::error::AppError;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "trashcan.json";
pub const MODEL_BASE_ENV: &str = "TRASHCAN_MODEL_BASE";

/// Memory layout of the model's image input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, size, size, 3]`, what Teachable Machine exports produce.
    Nhwc,
    /// `[1, 3, size, size]`
    Nchw,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory or URL prefix holding the model files.
    pub model_base: String,
    pub model_file: String,
    pub metadata_file: String,
    pub input_layout: InputLayout,
    pub use_gpu: bool,
    pub intra_threads: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_base: "model/".to_string(),
            model_file: "model.onnx".to_string(),
            metadata_file: "metadata.json".to_string(),
            input_layout: InputLayout::Nhwc,
            use_gpu: true,
            intra_threads: 4,
        }
    }
}

/// Where the model definition and its metadata are fetched from.
/// Each entry is either a filesystem path or an `http(s)://` URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSource {
    pub model: String,
    pub metadata: String,
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl AppConfig {
    /// Reads `trashcan.json` from the config directory if it exists, then
    /// applies the environment override for the model base.
    pub fn load(config_dir: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match config_dir.map(|d| d.join(CONFIG_FILE)) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_model_base_override(std::env::var(MODEL_BASE_ENV).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    pub fn apply_model_base_override(&mut self, base: Option<String>) {
        if let Some(base) = base.filter(|b| !b.trim().is_empty()) {
            self.model_base = base;
        }
    }

    /// Resolves the model files. A relative local base is looked up in the
    /// bundled resources first and falls back to the working directory.
    pub fn model_source(&self, resource_dir: Option<&Path>) -> ModelSource {
        if is_remote(&self.model_base) {
            let base = self.model_base.trim_end_matches('/');
            return ModelSource {
                model: format!("{}/{}", base, self.model_file),
                metadata: format!("{}/{}", base, self.metadata_file),
            };
        }

        let base = Path::new(&self.model_base);
        let dir = match resource_dir {
            Some(res) if base.is_relative() && res.join(base).is_dir() => res.join(base),
            _ => base.to_path_buf(),
        };

        ModelSource {
            model: dir.join(&self.model_file).to_string_lossy().to_string(),
            metadata: dir.join(&self.metadata_file).to_string_lossy().to_string(),
        }
    }
}
