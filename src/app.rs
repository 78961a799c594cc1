use crate::camera::{CameraPermission, Decoder};
use crate::feedback::{AudioFeedback, FeedbackSoundType};
use crate::messages::{Command, SessionEvent};
use crate::opener::UrlOpener;
use crate::screen::{self, ScannerView};
use crate::session::SessionController;
use crate::store::{Configuration, ConfigurationStore};

use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Scanner,
    Configuration,
}

/// Terminal front end: the scanner and configuration screens
pub struct App<P, D, O>
where
    D: Decoder,
{
    controller: SessionController<P, D, O>,
    configuration: Arc<ConfigurationStore>,
    feedback: AudioFeedback,
    input_rx: mpsc::Receiver<String>,
    screen: Screen,
}

impl<P, D, O> App<P, D, O>
where
    P: CameraPermission,
    D: Decoder,
    O: UrlOpener,
{
    pub fn new(
        controller: SessionController<P, D, O>,
        configuration: Arc<ConfigurationStore>,
        feedback: AudioFeedback,
        input_rx: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            controller,
            configuration,
            feedback,
            input_rx,
            screen: Screen::Scanner,
        }
    }

    pub async fn run(mut self, initial: Screen) {
        self.controller.check_permission().await;
        self.show(initial);

        loop {
            tracing::debug!("Main loop: waiting for event");
            tokio::select! {
                line = self.input_rx.recv() => {
                    let Some(line) = line else {
                        tracing::info!("Input closed, shutting down");
                        break;
                    };
                    if !self.handle_line(&line).await {
                        break;
                    }
                }
                Some(event) = self.controller.next_event() => {
                    self.handle_session_event(event).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.controller.teardown().await;
        tracing::info!("qr2wa shutdown complete");
    }

    /// Apply one line of input. Returns `false` when the user quits.
    async fn handle_line(&mut self, line: &str) -> bool {
        match self.screen {
            Screen::Configuration => {
                self.save_destination(line);
                self.show(Screen::Scanner);
                true
            }
            Screen::Scanner => self.handle_command(line).await,
        }
    }

    async fn handle_command(&mut self, line: &str) -> bool {
        let Some(command) = Command::parse(line) else {
            if !line.trim().is_empty() {
                println!("Unknown command {:?}, press ? for help", line.trim());
            }
            return true;
        };

        tracing::debug!("Command: {:?}", command);

        match command {
            Command::RequestPermission => self.controller.request_permission().await,
            Command::Start => {
                self.controller.start_scanning().await;
                if self.controller.is_active() {
                    self.feedback.play(FeedbackSoundType::Start);
                }
            }
            Command::Stop => {
                let was_active = self.controller.is_active();
                self.controller.stop_scanning().await;
                if was_active {
                    self.feedback.play(FeedbackSoundType::Stop);
                }
            }
            Command::Configure => {
                self.show(Screen::Configuration);
                return true;
            }
            Command::Help => println!("{}", screen::render_help()),
            Command::Quit => return false,
        }

        self.show(Screen::Scanner);
        true
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        let redraw = matches!(
            event,
            SessionEvent::PermissionChanged(_) | SessionEvent::DecoderExited { .. }
        );

        if self.controller.handle_event(event).await.is_some() {
            self.feedback.play(FeedbackSoundType::Match);
            self.show(Screen::Scanner);
        } else if redraw {
            self.show(Screen::Scanner);
        }
    }

    fn save_destination(&self, destination: &str) {
        if let Err(e) = self.configuration.save(&Configuration::new(destination)) {
            tracing::error!("{:#}", e);
            println!("!! Failed to save configuration: {:#}", e);
        }
    }

    fn show(&mut self, target: Screen) {
        self.screen = target;

        match target {
            Screen::Configuration => {
                print!("{}", screen::render_configuration(&self.configuration.load()));
            }
            Screen::Scanner => {
                let view = ScannerView {
                    permission: self.controller.permission_state(),
                    state: self.controller.state(),
                    error: self.controller.error_message(),
                    link: self.controller.last_link(),
                };
                print!("{}", screen::render_scanner(&view));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConstraints, SamplingConfig};
    use crate::messages::{PermissionState, SessionState};
    use crate::session::{ScanOptions, StopPolicy};
    use crate::store::MemoryStore;
    use crate::testing::{FakeDecoder, FakeOpener, FakePermission};
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    type TestApp = App<Arc<FakePermission>, Arc<FakeDecoder>, Arc<FakeOpener>>;

    fn app(permission: PermissionState) -> (TestApp, Arc<FakeDecoder>, Arc<FakeOpener>) {
        let decoder = Arc::new(FakeDecoder::default());
        let opener = Arc::new(FakeOpener::default());
        let configuration = Arc::new(ConfigurationStore::new(Box::new(MemoryStore::new())));
        let controller = SessionController::new(
            Arc::new(FakePermission::new(Some(permission), true)),
            decoder.clone(),
            opener.clone(),
            configuration.clone(),
            ScanOptions {
                constraints: CameraConstraints::default(),
                sampling: SamplingConfig::default(),
                stop_policy: StopPolicy::Manual,
            },
        );
        let (_tx, rx) = mpsc::channel(1);

        let app = App::new(
            controller,
            configuration,
            AudioFeedback::new(HashMap::new()),
            rx,
        );
        (app, decoder, opener)
    }

    #[tokio::test]
    async fn test_configure_then_scan_uses_new_destination() {
        let (mut app, decoder, opener) = app(PermissionState::Granted);
        app.controller.check_permission().await;

        assert!(app.handle_line("c").await);
        assert_eq!(app.screen, Screen::Configuration);

        assert!(app.handle_line("14155550123").await);
        assert_eq!(app.screen, Screen::Scanner);
        assert_eq!(app.configuration.load().destination, "14155550123");

        app.handle_line("s").await;
        decoder.decode("invoice#42");
        let event = app.controller.next_event().await.unwrap();
        app.handle_session_event(event).await;

        assert_eq!(
            *opener.opened.lock().unwrap(),
            vec!["https://wa.me/14155550123?text=invoice%2342".to_string()]
        );
    }

    #[tokio::test]
    async fn test_start_stop_commands() {
        let (mut app, decoder, _) = app(PermissionState::Granted);
        app.controller.check_permission().await;

        app.handle_line("s").await;
        assert_eq!(app.controller.state(), SessionState::Scanning);

        app.handle_line("x").await;
        assert_eq!(app.controller.state(), SessionState::Idle);
        assert_eq!(decoder.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_quit_and_unknown_commands() {
        let (mut app, _, _) = app(PermissionState::Unrequested);

        assert!(app.handle_line("bogus").await);
        assert!(app.handle_line("").await);
        assert!(!app.handle_line("q").await);
    }
}
