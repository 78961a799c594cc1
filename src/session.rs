use crate::camera::{
    CameraConstraints, CameraPermission, DecodeCallbacks, Decoder, PermissionSubscription,
    SamplingConfig,
};
use crate::error::SessionError;
use crate::link::whatsapp_link;
use crate::messages::{PermissionState, SessionEvent, SessionState};
use crate::opener::UrlOpener;
use crate::store::ConfigurationStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What happens to a running session once a payload has been acted upon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPolicy {
    /// Keep the camera running until the user stops it
    #[default]
    Manual,
    /// Stop the decoder as soon as the link is opened
    Auto,
}

/// Everything the controller passes to the decoder on start
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub constraints: CameraConstraints,
    pub sampling: SamplingConfig,
    pub stop_policy: StopPolicy,
}

/// Owns the scan lifecycle
///
/// Tracks camera permission and session activity, holds the decoder handle,
/// and turns the first decode of each session into a WhatsApp link. All
/// operations take `&mut self`, so start and stop can never overlap.
pub struct SessionController<P, D, O>
where
    D: Decoder,
{
    permission: P,
    decoder: D,
    opener: O,
    configuration: Arc<ConfigurationStore>,
    options: ScanOptions,

    permission_state: PermissionState,
    permission_changes: Option<PermissionSubscription>,
    state: SessionState,
    handle: Option<D::Handle>,
    generation: u64,
    has_scanned: bool,
    faulted: bool,
    last_link: Option<String>,
    error: Option<SessionError>,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<P, D, O> SessionController<P, D, O>
where
    P: CameraPermission,
    D: Decoder,
    O: UrlOpener,
{
    pub fn new(
        permission: P,
        decoder: D,
        opener: O,
        configuration: Arc<ConfigurationStore>,
        options: ScanOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            permission,
            decoder,
            opener,
            configuration,
            options,
            permission_state: PermissionState::Unrequested,
            permission_changes: None,
            state: SessionState::Idle,
            handle: None,
            generation: 0,
            has_scanned: false,
            faulted: false,
            last_link: None,
            error: None,
            events_tx,
            events_rx,
        }
    }

    pub fn permission_state(&self) -> PermissionState {
        self.permission_state
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Link produced by the current session, if any
    pub fn last_link(&self) -> Option<&str> {
        self.last_link.as_deref()
    }

    /// Banner message for the last user-visible failure
    pub fn error_message(&self) -> Option<&'static str> {
        self.error.as_ref().and_then(SessionError::user_message)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Scanning | SessionState::Matched)
    }

    /// Read the current permission without prompting and follow its changes
    pub async fn check_permission(&mut self) {
        match self.permission.query().await {
            Ok(status) => {
                tracing::info!("Camera permission: {}", status.state);
                self.permission_state = status.state;
                self.permission_changes = Some(status.changes);
            }
            Err(e) => {
                let error = SessionError::PermissionQueryFailed(format!("{:#}", e));
                tracing::warn!("{}", error);
                self.permission_state = PermissionState::Unrequested;
            }
        }
    }

    /// Prompt for camera access
    pub async fn request_permission(&mut self) {
        match self.permission.request().await {
            Ok(()) => {
                tracing::info!("Camera permission granted");
                self.permission_state = PermissionState::Granted;
                self.error = None;
            }
            Err(e) => {
                let error = SessionError::PermissionDenied(format!("{:#}", e));
                tracing::error!("{}", error);
                self.permission_state = PermissionState::Denied;
                self.error = Some(error);
            }
        }
    }

    /// Start a new scanning session
    ///
    /// Without granted permission this requests it instead and returns; the
    /// user starts again once access is granted.
    pub async fn start_scanning(&mut self) {
        if self.state != SessionState::Idle {
            tracing::debug!("Already {}, ignoring start", self.state);
            return;
        }

        if self.faulted {
            tracing::warn!("Scanner is in an unknown state, refusing to start");
            return;
        }

        self.error = None;
        self.has_scanned = false;
        self.last_link = None;

        if self.permission_state != PermissionState::Granted {
            tracing::info!("Camera permission is {}, requesting it", self.permission_state);
            self.request_permission().await;
            return;
        }

        self.generation += 1;
        let callbacks = self.callbacks(self.generation);

        match self
            .decoder
            .start(&self.options.constraints, &self.options.sampling, callbacks)
            .await
        {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Scanning;
                tracing::info!("Scanning started (session {})", self.generation);
            }
            Err(e) => {
                let error = SessionError::ScanStartFailed(format!("{:#}", e));
                tracing::error!("{}", error);
                self.error = Some(error);
            }
        }
    }

    /// Stop the running session and forget its result
    pub async fn stop_scanning(&mut self) {
        if !self.is_active() {
            tracing::debug!("Not scanning, ignoring stop");
            return;
        }

        self.stop_decoder().await;
        self.last_link = None;
    }

    /// Act on a decoded payload. Returns the link when one was produced.
    pub async fn on_decode_success(&mut self, payload: String) -> Option<String> {
        if self.state != SessionState::Scanning || self.has_scanned {
            tracing::debug!("Ignoring decode while {}", self.state);
            return None;
        }
        self.has_scanned = true;

        let destination = self.configuration.load().destination;
        let link = whatsapp_link(&payload, &destination);
        tracing::info!("Decoded {} chars", payload.chars().count());
        tracing::debug!("Opening {}", link);

        if let Err(e) = self.opener.open(&link).await {
            tracing::warn!("Failed to open link, it stays available on screen: {:#}", e);
        }

        self.last_link = Some(link.clone());
        self.state = SessionState::Matched;

        if self.options.stop_policy == StopPolicy::Auto {
            self.stop_decoder().await;
        }

        Some(link)
    }

    pub fn on_decode_error(&self, error: &str) {
        tracing::trace!("Decode miss: {}", error);
    }

    /// The decoder ended on its own. The session is over and the user has to
    /// start again.
    pub fn on_decoder_exit(&mut self, reason: String) {
        if self.handle.take().is_none() {
            tracing::debug!("Decoder exit after stop: {}", reason);
            return;
        }

        let error = SessionError::ScannerExited(reason);
        tracing::error!("{}", error);
        self.state = SessionState::Idle;
        self.error = Some(error);
    }

    /// Wait for the next decoder callback or permission change
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let events = &mut self.events_rx;
        let changes = &mut self.permission_changes;

        let permission = async move {
            match changes {
                Some(subscription) => subscription.changed().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            Some(event) = events.recv() => Some(event),
            Some(state) = permission => Some(SessionEvent::PermissionChanged(state)),
            else => None,
        }
    }

    /// Apply an event. Returns the link when a decode produced one.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Option<String> {
        match event {
            SessionEvent::Decoded { session, payload } if session == self.generation => {
                self.on_decode_success(payload).await
            }
            SessionEvent::DecodeMiss { session, error } if session == self.generation => {
                self.on_decode_error(&error);
                None
            }
            SessionEvent::DecoderExited { session, reason } if session == self.generation => {
                self.on_decoder_exit(reason);
                None
            }
            SessionEvent::Decoded { session, .. }
            | SessionEvent::DecodeMiss { session, .. }
            | SessionEvent::DecoderExited { session, .. } => {
                tracing::debug!("Dropping event from stale session {}", session);
                None
            }
            SessionEvent::PermissionChanged(state) => {
                tracing::info!("Camera permission changed to {}", state);
                self.permission_state = state;
                None
            }
        }
    }

    /// Release the camera and the permission feed
    ///
    /// Failures are logged only; there is nothing left to show them on.
    pub async fn teardown(mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.decoder.stop(handle).await {
                tracing::warn!("Failed to stop scanner during teardown: {:#}", e);
            }
        }

        if let Some(mut changes) = self.permission_changes.take() {
            changes.cancel();
        }

        tracing::debug!("Session controller torn down");
    }

    async fn stop_decoder(&mut self) {
        let Some(handle) = self.handle.take() else {
            self.state = SessionState::Idle;
            return;
        };

        self.state = SessionState::Idle;

        match self.decoder.stop(handle).await {
            Ok(()) => tracing::info!("Scanning stopped (session {})", self.generation),
            Err(e) => {
                let error = SessionError::ScanStopFailed(format!("{:#}", e));
                tracing::error!("{}", error);
                self.error = Some(error);
                self.faulted = true;
            }
        }
    }

    fn callbacks(&self, session: u64) -> DecodeCallbacks {
        let decoded_tx = self.events_tx.clone();
        let miss_tx = self.events_tx.clone();
        let exit_tx = self.events_tx.clone();

        DecodeCallbacks {
            on_success: Box::new(move |payload| {
                let _ = decoded_tx.send(SessionEvent::Decoded { session, payload });
            }),
            on_error: Box::new(move |error| {
                let _ = miss_tx.send(SessionEvent::DecodeMiss { session, error });
            }),
            on_exit: Box::new(move |reason| {
                let _ = exit_tx.send(SessionEvent::DecoderExited { session, reason });
            }),
        }
    }
}

impl<P, D, O> Drop for SessionController<P, D, O>
where
    D: Decoder,
{
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            tracing::warn!("Session dropped while scanning, releasing camera");
        }
    }
}
