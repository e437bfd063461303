use thiserror::Error;
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("no plottable stream found")]
    NoPlottableStream,
    #[error("stream '{name}' has an irregular sample rate and cannot be swept")]
    IrregularSampleRate { name: String },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("inlet closed: {0}")]
    InletClosed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to draw sweep: {0}")]
    Draw(String),
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ScopeError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ScopeError::Draw(format!("{value:?}"))
    }
}
