use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Model is not ready")]
    NotReady,

    #[error("Model is already loading")]
    AlreadyLoading,

    #[error("{0}")]
    ModelLoad(String),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Inference(String),

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotReady => "not_ready",
            AppError::AlreadyLoading => "already_loading",
            AppError::ModelLoad(_) => "model_load",
            AppError::Decode(_) => "decode",
            AppError::Inference(_) => "inference",
            AppError::Config(_) => "config",
            AppError::Http(_) => "http",
        }
    }
}

// Commands return this to the webview, which only understands plain objects.
impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
