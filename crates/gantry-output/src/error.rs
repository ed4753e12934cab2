#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("failed to serialize tool output: {0}")]
    Serialize(#[from] serde_json::Error),
}
