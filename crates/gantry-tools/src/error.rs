#[derive(Debug, thiserror::Error)]
pub enum ToolsError {
    #[error("tool {name} is already registered with the host")]
    Duplicate { name: String },

    #[error("failed to register tool {name}: {message}")]
    Registration { name: String, message: String },

    #[error("invalid discover-tools parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error(transparent)]
    Shape(#[from] gantry_output::ShapeError),
}
