use crate::messages::PermissionState;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of a permission query: the current state plus a feed of changes
pub struct PermissionStatus {
    pub state: PermissionState,
    pub changes: PermissionSubscription,
}

/// Out-of-band permission changes
///
/// Dropping or cancelling the subscription stops whatever task feeds it.
pub struct PermissionSubscription {
    rx: watch::Receiver<PermissionState>,
    watcher: Option<JoinHandle<()>>,
}

impl PermissionSubscription {
    pub fn new(rx: watch::Receiver<PermissionState>, watcher: Option<JoinHandle<()>>) -> Self {
        Self { rx, watcher }
    }

    /// Wait for the next change. `None` once the feed has ended.
    pub async fn changed(&mut self) -> Option<PermissionState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn cancel(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for PermissionSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Platform camera permission
#[async_trait]
pub trait CameraPermission: Send + Sync {
    /// Report the current permission without prompting the user
    async fn query(&self) -> Result<PermissionStatus>;

    /// Ask for camera access. `Ok` means access was granted.
    async fn request(&self) -> Result<()>;
}

/// Permission derived from access to a V4L2 device node
///
/// A readable node counts as granted and `EACCES` as denied. A missing node
/// has not been granted or refused yet, since the camera may still be plugged
/// in. Changes are picked up by polling the node.
pub struct DevicePermission {
    device: PathBuf,
    poll_interval: Duration,
}

impl DevicePermission {
    pub fn new(device: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            device: device.into(),
            poll_interval,
        }
    }

    async fn watch_device(
        device: PathBuf,
        poll_interval: Duration,
        tx: watch::Sender<PermissionState>,
    ) {
        loop {
            tokio::time::sleep(poll_interval).await;

            if tx.is_closed() {
                break;
            }

            match probe(&device).await {
                Ok(state) => {
                    tx.send_if_modified(|current| {
                        if *current == state {
                            return false;
                        }
                        tracing::debug!("Camera permission for {:?} is now {}", device, state);
                        *current = state;
                        true
                    });
                }
                Err(e) => tracing::debug!("Permission probe failed: {:#}", e),
            }
        }
    }
}

#[async_trait]
impl CameraPermission for DevicePermission {
    async fn query(&self) -> Result<PermissionStatus> {
        let state = probe(&self.device).await?;

        let (tx, rx) = watch::channel(state);
        let watcher = tokio::spawn(Self::watch_device(
            self.device.clone(),
            self.poll_interval,
            tx,
        ));

        Ok(PermissionStatus {
            state,
            changes: PermissionSubscription::new(rx, Some(watcher)),
        })
    }

    async fn request(&self) -> Result<()> {
        match probe(&self.device).await? {
            PermissionState::Granted => Ok(()),
            PermissionState::Denied => bail!(
                "access to {:?} was refused; the user needs to be in the device's group",
                self.device
            ),
            PermissionState::Unrequested => bail!("no camera found at {:?}", self.device),
        }
    }
}

async fn probe(device: &Path) -> Result<PermissionState> {
    match tokio::fs::File::open(device).await {
        Ok(_) => Ok(PermissionState::Granted),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(PermissionState::Denied),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(PermissionState::Unrequested),
        Err(e) => Err(e).with_context(|| format!("Failed to probe camera device {:?}", device)),
    }
}
