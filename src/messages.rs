use std::fmt;

/// Camera permission as last reported by the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionState {
    Unrequested,
    Granted,
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionState::Unrequested => "not requested",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        f.write_str(label)
    }
}

/// Scan session activity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    /// Still scanning, but a payload has already been acted upon
    Matched,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Matched => "matched",
        };
        f.write_str(label)
    }
}

/// Events delivered to the session controller
///
/// Decoder events carry the generation of the session that produced them so
/// late events from a stopped session can be told apart.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Decoded { session: u64, payload: String },
    DecodeMiss { session: u64, error: String },
    /// The decoder stopped on its own, e.g. the camera was unplugged
    DecoderExited { session: u64, reason: String },
    PermissionChanged(PermissionState),
}

/// User commands on the scanner screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    RequestPermission,
    Start,
    Stop,
    Configure,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "p" | "permission" => Some(Command::RequestPermission),
            "s" | "start" => Some(Command::Start),
            "x" | "stop" | "restart" => Some(Command::Stop),
            "c" | "config" | "configure" => Some(Command::Configure),
            "?" | "h" | "help" => Some(Command::Help),
            "q" | "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
