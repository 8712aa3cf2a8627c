use thiserror::Error;

/// Failures while decoding an embedded protocol payload.
///
/// Both variants are expected, non-fatal conditions: the router logs them
/// and drops the payload without surfacing anything to the sender.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Spoofed sender: payload claims {claimed} but transport reports {actual}")]
    SpoofedSender { claimed: String, actual: String },
}

/// Failures reported by the AI inference collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("No AI model is configured")]
    NoModelAvailable,

    #[error("Model {0} is not downloaded")]
    ModelNotDownloaded(String),

    #[error("Model initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl AiError {
    /// Remediation hint shown to the local user as a system notice.
    pub fn remediation(&self) -> &'static str {
        match self {
            AiError::NoModelAvailable => "Configure an AI model in settings to enable replies.",
            AiError::ModelNotDownloaded(_) => "Download the model before enabling auto-respond.",
            AiError::InitializationFailed(_) => {
                "Model failed to initialize. Restart the app or pick another model."
            }
            AiError::InferenceFailed(_) => "Inference failed. Try again with a shorter prompt.",
        }
    }
}
