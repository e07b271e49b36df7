use shared::ErrorResponse;

/// Per-request failure taxonomy. Every variant is reported to the client as a
/// structured JSON error body; none of them may crash the process.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("No image provided")]
    MissingInput,
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Model error: {0}")]
    Model(#[from] tch::TchError),
    #[error("Heatmap rendering failed: {0}")]
    Render(String),
}

impl AnalyzeError {
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.to_string())
    }
}
