//! In-memory stand-ins for the platform capabilities, shared by unit tests.

use crate::camera::permission::PermissionStatus;
use crate::camera::{
    CameraConstraints, CameraPermission, DecodeCallbacks, Decoder, PermissionSubscription,
    SamplingConfig,
};
use crate::messages::PermissionState;
use crate::opener::UrlOpener;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub struct FakePermission {
    pub initial: Option<PermissionState>,
    pub accept: AtomicBool,
    pub requests: AtomicUsize,
    pub changes: Mutex<Option<watch::Receiver<PermissionState>>>,
}

impl FakePermission {
    pub fn new(initial: Option<PermissionState>, accept: bool) -> Self {
        Self {
            initial,
            accept: AtomicBool::new(accept),
            requests: AtomicUsize::new(0),
            changes: Mutex::new(None),
        }
    }

    pub fn with_changes(mut self, rx: watch::Receiver<PermissionState>) -> Self {
        self.changes = Mutex::new(Some(rx));
        self
    }
}

#[async_trait]
impl CameraPermission for Arc<FakePermission> {
    async fn query(&self) -> Result<PermissionStatus> {
        let state = self.initial.ok_or_else(|| anyhow!("permissions API missing"))?;
        let rx = self
            .changes
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| watch::channel(state).1);
        Ok(PermissionStatus {
            state,
            changes: PermissionSubscription::new(rx, None),
        })
    }

    async fn request(&self) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.accept.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow!("user dismissed the prompt"))
        }
    }
}

#[derive(Default)]
pub struct FakeDecoder {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub callbacks: Mutex<Option<DecodeCallbacks>>,
}

impl FakeDecoder {
    pub fn decode(&self, payload: &str) {
        let callbacks = self.callbacks.lock().unwrap();
        (callbacks.as_ref().expect("decoder started").on_success)(payload.to_string());
    }

    pub fn miss(&self, error: &str) {
        let callbacks = self.callbacks.lock().unwrap();
        (callbacks.as_ref().expect("decoder started").on_error)(error.to_string());
    }

    pub fn exit(&self, reason: &str) {
        let callbacks = self.callbacks.lock().unwrap();
        (callbacks.as_ref().expect("decoder started").on_exit)(reason.to_string());
    }
}

#[async_trait]
impl Decoder for Arc<FakeDecoder> {
    type Handle = ();

    async fn start(
        &self,
        _constraints: &CameraConstraints,
        _sampling: &SamplingConfig,
        callbacks: DecodeCallbacks,
    ) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(anyhow!("camera busy"));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.callbacks.lock().unwrap() = Some(callbacks);
        Ok(())
    }

    async fn stop(&self, _handle: ()) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(anyhow!("device wedged"));
        }
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeOpener {
    pub opened: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl UrlOpener for Arc<FakeOpener> {
    async fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        if self.fail {
            Err(anyhow!("no browser"))
        } else {
            Ok(())
        }
    }
}
