use super::options::{CameraConstraints, SamplingConfig};
use anyhow::Result;
use async_trait::async_trait;

pub type DecodeCallback = Box<dyn Fn(String) + Send + Sync>;

/// Callbacks invoked from the decoder's own tasks
pub struct DecodeCallbacks {
    /// A payload was recognised in a frame
    pub on_success: DecodeCallback,
    /// A frame could not be decoded. Expected, and never a session failure.
    pub on_error: DecodeCallback,
    /// Capture ended without `stop` being called. Called at most once, with
    /// the reason.
    pub on_exit: DecodeCallback,
}

/// Camera capture plus QR decoding
///
/// `start` acquires the camera and keeps reporting through the callbacks until
/// the returned handle is passed to `stop`. Dropping a handle without calling
/// `stop` must still release the camera.
#[async_trait]
pub trait Decoder: Send + Sync {
    type Handle: Send;

    async fn start(
        &self,
        constraints: &CameraConstraints,
        sampling: &SamplingConfig,
        callbacks: DecodeCallbacks,
    ) -> Result<Self::Handle>;

    async fn stop(&self, handle: Self::Handle) -> Result<()>;
}
