use crate::dom::DomError;
use thiserror::Error;

/// Failures inside an adapter operation. Public adapter methods log these
/// and report `false`; they never reach the plugin host as errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("text injection failed: {0}")]
    InjectionFailed(String),
    #[error("file transfer failed: {0}")]
    TransferFailed(String),
    #[error("control render failed: {0}")]
    RenderFailed(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl AdapterError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ElementNotFound(_) => "element_not_found",
            Self::InjectionFailed(_) => "injection_failed",
            Self::TransferFailed(_) => "transfer_failed",
            Self::RenderFailed(_) => "render_failed",
            Self::Unsupported(_) => "unsupported",
            Self::Dom(_) => "dom",
        }
    }
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
