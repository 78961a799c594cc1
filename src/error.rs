use thiserror::Error;

/// Failures the scan session can run into.
///
/// None of these are fatal to the application. Each one narrows to a local
/// state change, and the ones that are user-visible carry a banner message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The platform could not report the camera permission. Degrades to
    /// `Unrequested` without telling the user.
    #[error("camera permission query failed: {0}")]
    PermissionQueryFailed(String),

    /// The user refused camera access, or the prompt itself failed.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// The decoder could not acquire the camera.
    #[error("failed to start scanner: {0}")]
    ScanStartFailed(String),

    /// The decoder quit while a session was running.
    #[error("scanner stopped unexpectedly: {0}")]
    ScannerExited(String),

    /// The decoder could not be stopped. Its state can no longer be trusted,
    /// so the session refuses to start again.
    #[error("failed to stop scanner: {0}")]
    ScanStopFailed(String),

    /// The stored configuration record could not be parsed.
    #[error("stored configuration is malformed: {0}")]
    ConfigParseFailed(String),
}

impl SessionError {
    /// Message for the error banner, `None` for failures that degrade silently.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            SessionError::PermissionDenied(_) => {
                Some("Camera permission was denied. Please grant permission and try again.")
            }
            SessionError::ScanStartFailed(_) => {
                Some("Failed to start the scanner. Please try again.")
            }
            SessionError::ScannerExited(_) => {
                Some("The camera stopped unexpectedly. Please start scanning again.")
            }
            SessionError::ScanStopFailed(_) => {
                Some("Failed to stop the scanner. Please restart the application.")
            }
            SessionError::PermissionQueryFailed(_) | SessionError::ConfigParseFailed(_) => None,
        }
    }
}
