use crate::messages::{PermissionState, SessionState};
use crate::store::Configuration;
use std::fmt::Write;

/// What the scanner screen shows
#[derive(Debug, Clone, Copy)]
pub struct ScannerView<'a> {
    pub permission: PermissionState,
    pub state: SessionState,
    pub error: Option<&'a str>,
    pub link: Option<&'a str>,
}

pub fn render_scanner(view: &ScannerView<'_>) -> String {
    let mut out = String::new();
    let active = matches!(view.state, SessionState::Scanning | SessionState::Matched);

    let _ = writeln!(out, "== Scan QR Code ==");
    let _ = writeln!(out, "Camera permission: {}", view.permission);
    let _ = writeln!(out, "Scanner: {}", view.state);

    if let Some(error) = view.error {
        let _ = writeln!(out, "!! {}", error);
    }

    if view.permission != PermissionState::Granted {
        let _ = writeln!(out, "[p] Request camera permission");
    } else if !active {
        let _ = writeln!(out, "[s] Start scanning");
    }

    if active {
        let label = if view.link.is_some() {
            "Restart"
        } else {
            "Stop scanning"
        };
        let _ = writeln!(out, "[x] {}", label);
    }

    if let Some(link) = view.link {
        let _ = writeln!(out, "Open in WhatsApp: {}", link);
    }

    let _ = writeln!(out, "[c] Configure  [?] Help  [q] Quit");
    out
}

pub fn render_configuration(current: &Configuration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== Configure QR Scanner ==");

    if current.destination.is_empty() {
        let _ = writeln!(out, "Default WhatsApp number or group id: (none)");
    } else {
        let _ = writeln!(
            out,
            "Default WhatsApp number or group id: {}",
            current.destination
        );
    }

    let _ = writeln!(
        out,
        "Enter phone number with country code or group id (empty line to clear):"
    );
    out
}

pub fn render_help() -> String {
    [
        "p  request camera permission",
        "s  start scanning",
        "x  stop scanning (restart after a match)",
        "c  configure the default destination",
        "?  show this help",
        "q  quit",
    ]
    .join("\n")
}
