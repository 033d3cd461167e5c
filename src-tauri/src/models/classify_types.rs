use serde::{Deserialize, Serialize};

/// Lifecycle of the loaded model as seen by the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
    pub model_name: Option<String>,
    pub labels: Vec<String>,
}

fn default_image_size() -> u32 {
    224
}

/// `metadata.json` as exported by Teachable Machine.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub labels: Vec<String>,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub tm_version: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

/// Scores for the two classes, in model order {not-full, full}.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct ProbabilityPair {
    pub not_full: f32,
    pub full: f32,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NotFull,
    Full,
    Undecided,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: &str) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassifyOutcome {
    pub request_id: u64,
    pub width: u32,
    pub height: u32,
    pub predictions: Vec<Prediction>,
    pub probabilities: ProbabilityPair,
    pub verdict: Verdict,
    /// Only set for the most recent upload with a decided verdict.
    pub notification: Option<Notification>,
    /// A newer upload started before this one finished.
    pub superseded: bool,
}
