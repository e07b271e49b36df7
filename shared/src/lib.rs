use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone)]
pub struct AnalyzeResponse {
    pub status: String,
    pub result: String,
    pub confidence: f32,
    pub explanation: String,
    pub heatmap: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl AnalyzeResponse {
    pub fn success(
        result: impl Into<String>,
        confidence: f32,
        explanation: impl Into<String>,
        heatmap: impl Into<String>,
    ) -> Self {
        Self {
            status: "success".into(),
            result: result.into(),
            confidence,
            explanation: explanation.into(),
            heatmap: heatmap.into(),
        }
    }
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: message.into(),
        }
    }
}

/// Color scale applied when the saliency heatmap is rendered over the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HeatmapStyle {
    Jet,
    Hot,
    Grayscale,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        HeatmapStyle::Jet
    }
}
