use super::decoder::{DecodeCallback, DecodeCallbacks, Decoder};
use super::options::{CameraConstraints, SamplingConfig};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::bytes::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

// One complete `<symbol>` element of zbarcam's XML output. Text payloads
// are CDATA sections, anything else is base64 with `format='base64'`.
static SYMBOL_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<symbol(?P<attrs>[^>]*)>.*?<data(?P<format>[^>]*)>(?P<data>(?:<!\[CDATA\[.*?\]\]>|[^<])*)</data>.*?</symbol>",
    )
    .expect("valid regex")
});

static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(?P<text>.*?)\]\]>").expect("valid regex"));

static SYMBOL_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"type='(?P<type>[^']*)'").expect("valid regex"));

/// Decoder backed by the `zbarcam` program
///
/// The child process owns the camera. Its XML output is read on a task and
/// every complete symbol is reported through the success callback, no more
/// often than the sampling rate allows. Its stderr is reported as decode
/// misses, and the end of its output as an exit.
pub struct ZbarDecoder {
    program: String,
    args: Vec<String>,
    startup_grace: Duration,
}

/// Running `zbarcam` process. Dropping it kills the process.
pub struct ZbarHandle {
    child: Child,
    reader: JoinHandle<()>,
    errors: JoinHandle<()>,
}

impl Drop for ZbarHandle {
    fn drop(&mut self) {
        self.reader.abort();
        self.errors.abort();
    }
}

impl ZbarDecoder {
    /// `args` go before the generated zbarcam arguments, so wrappers such as
    /// `flatpak-spawn --host zbarcam` can be configured.
    pub fn new(program: impl Into<String>, args: Vec<String>, startup_grace: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            startup_grace,
        }
    }

    fn command(&self, constraints: &CameraConstraints) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--nodisplay")
            .arg("--xml")
            .arg("-Sdisable")
            .arg("-Sqrcode.enable")
            .arg(format!(
                "--prescale={}x{}",
                constraints.width, constraints.height
            ))
            .arg(&constraints.device)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn read_decodes(
        mut stdout: ChildStdout,
        interval: Duration,
        on_success: DecodeCallback,
        on_exit: DecodeCallback,
    ) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        let mut last_reported: Option<Instant> = None;

        let reason = loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => break "decoder output closed".to_string(),
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);

                    for payload in drain_symbols(&mut buffer) {
                        if last_reported.is_some_and(|at| at.elapsed() < interval) {
                            tracing::trace!("Dropping decode inside sampling interval");
                            continue;
                        }
                        last_reported = Some(Instant::now());
                        on_success(payload);
                    }
                }
                Err(e) => break format!("failed to read decoder output: {}", e),
            }
        };

        tracing::debug!("Decoder reader finished: {}", reason);
        on_exit(reason);
    }

    async fn read_misses(stderr: ChildStderr, on_error: DecodeCallback) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            on_error(line);
        }
    }
}

#[async_trait]
impl Decoder for ZbarDecoder {
    type Handle = ZbarHandle;

    async fn start(
        &self,
        constraints: &CameraConstraints,
        sampling: &SamplingConfig,
        callbacks: DecodeCallbacks,
    ) -> Result<ZbarHandle> {
        if let Some(region) = sampling.region {
            // zbarcam scans the whole frame; the box only matters for display
            tracing::debug!(
                "Scan box {}px (not applied by zbarcam)",
                region.edge_for(constraints.width, constraints.height)
            );
        }

        let mut child = self
            .command(constraints)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        let stdout = child
            .stdout
            .take()
            .context("Failed to capture decoder stdout")?;
        let mut stderr = child
            .stderr
            .take()
            .context("Failed to capture decoder stderr")?;

        // A busy or missing camera makes zbarcam exit right away
        tokio::time::sleep(self.startup_grace).await;
        if let Some(status) = child
            .try_wait()
            .context("Failed to check decoder status")?
        {
            let mut message = String::new();
            let _ = stderr.read_to_string(&mut message).await;
            bail!(
                "{} exited during startup ({}): {}",
                self.program,
                status,
                message.trim()
            );
        }

        let reader = tokio::spawn(Self::read_decodes(
            stdout,
            sampling.interval(),
            callbacks.on_success,
            callbacks.on_exit,
        ));
        let errors = tokio::spawn(Self::read_misses(stderr, callbacks.on_error));

        tracing::info!(
            "Decoder started on {:?} at {} fps",
            constraints.device,
            sampling.fps
        );

        Ok(ZbarHandle {
            child,
            reader,
            errors,
        })
    }

    async fn stop(&self, mut handle: ZbarHandle) -> Result<()> {
        if let Some(status) = handle
            .child
            .try_wait()
            .context("Failed to check decoder status")?
        {
            tracing::debug!("Decoder had already exited ({})", status);
            return Ok(());
        }

        handle
            .child
            .kill()
            .await
            .context("Failed to stop decoder process")?;

        tracing::info!("Decoder stopped");
        Ok(())
    }
}

/// Take every complete symbol out of `buffer`, leaving only bytes that may
/// still become part of one
fn drain_symbols(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut consumed = 0;

    for caps in SYMBOL_ELEMENT.captures_iter(&buffer[..]) {
        if let Some(element) = caps.get(0) {
            consumed = element.end();
        }
        if let Some(payload) = symbol_payload(&caps) {
            payloads.push(payload);
        }
    }

    let rest = &buffer[consumed..];
    let pending = rest
        .windows(b"<symbol".len())
        .position(|window| window == b"<symbol")
        .or_else(|| {
            rest.iter()
                .rposition(|&b| b == b'<')
                .filter(|&open| !rest[open..].contains(&b'>'))
        })
        .unwrap_or(rest.len());
    buffer.drain(..consumed + pending);

    payloads
}

fn symbol_payload(caps: &regex::bytes::Captures<'_>) -> Option<String> {
    let symbology = SYMBOL_TYPE
        .captures(&caps["attrs"])
        .map(|t| String::from_utf8_lossy(&t["type"]).into_owned())
        .unwrap_or_default();

    let raw = &caps["data"];
    let mut data = Vec::with_capacity(raw.len());
    if CDATA.is_match(raw) {
        for section in CDATA.captures_iter(raw) {
            data.extend_from_slice(&section["text"]);
        }
    } else {
        data.extend_from_slice(raw);
    }

    if caps["format"].windows(6).any(|w| w == b"base64") {
        let encoded: Vec<u8> = data
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        data = match BASE64.decode(&encoded) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Dropping {} symbol with bad base64 data: {}", symbology, e);
                return None;
            }
        };
    }

    tracing::trace!("Decoded {} symbol", symbology);
    Some(String::from_utf8_lossy(&data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn script_decoder(script: &str, startup_grace: Duration) -> ZbarDecoder {
        ZbarDecoder::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "zbarcam".to_string()],
            startup_grace,
        )
    }

    type Recorded = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        decoded: Recorded,
        missed: Recorded,
        exited: Recorded,
    }

    fn recording_callbacks() -> (DecodeCallbacks, Recorder) {
        let recorder = Recorder {
            decoded: Arc::new(Mutex::new(Vec::new())),
            missed: Arc::new(Mutex::new(Vec::new())),
            exited: Arc::new(Mutex::new(Vec::new())),
        };
        let decoded = recorder.decoded.clone();
        let missed = recorder.missed.clone();
        let exited = recorder.exited.clone();

        let callbacks = DecodeCallbacks {
            on_success: Box::new(move |payload| decoded.lock().unwrap().push(payload)),
            on_error: Box::new(move |error| missed.lock().unwrap().push(error)),
            on_exit: Box::new(move |reason| exited.lock().unwrap().push(reason)),
        };
        (callbacks, recorder)
    }

    fn symbol(data: &str) -> String {
        format!(
            "<symbol type='QR-Code' quality='1' orientation='UP'><data><![CDATA[{}]]></data></symbol>\n",
            data
        )
    }

    #[test]
    fn test_drain_symbols_skips_document_header() {
        let mut buffer = format!(
            "<barcodes xmlns='http://zbar.sourceforge.net/2008/barcode'>\n<source device='/dev/video0'>\n<index num='3'>\n{}</index>\n",
            symbol("https://example.com/a:b")
        )
        .into_bytes();

        assert_eq!(drain_symbols(&mut buffer), vec!["https://example.com/a:b"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_symbols_keeps_multi_line_payload_whole() {
        let mut buffer = symbol("BEGIN:VCARD\nFN:Jo\nEND:VCARD").into_bytes();
        assert_eq!(
            drain_symbols(&mut buffer),
            vec!["BEGIN:VCARD\nFN:Jo\nEND:VCARD"]
        );
    }

    #[test]
    fn test_drain_symbols_waits_for_complete_element() {
        let whole = symbol("WIFI:S:home;T:WPA;P:secret;;");
        let (head, tail) = whole.split_at(40);
        let mut buffer = head.as_bytes().to_vec();

        assert!(drain_symbols(&mut buffer).is_empty());
        assert_eq!(buffer, head.as_bytes());

        buffer.extend_from_slice(tail.as_bytes());
        assert_eq!(
            drain_symbols(&mut buffer),
            vec!["WIFI:S:home;T:WPA;P:secret;;"]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_symbols_joins_split_cdata_sections() {
        let mut buffer =
            b"<symbol type='QR-Code'><data><![CDATA[a]]]]><![CDATA[>b]]></data></symbol>".to_vec();
        assert_eq!(drain_symbols(&mut buffer), vec!["a]]>b"]);
    }

    #[test]
    fn test_drain_symbols_decodes_base64_data() {
        let mut buffer = b"<symbol type='QR-Code'><data format='base64' length='7'><![CDATA[\n8J+Ri2hpIQ==\n]]></data></symbol>".to_vec();
        assert_eq!(drain_symbols(&mut buffer), vec!["\u{1F44B}hi!"]);
    }

    #[test]
    fn test_command_line() {
        let decoder = ZbarDecoder::new("zbarcam", Vec::new(), Duration::ZERO);
        let command = decoder.command(&CameraConstraints::default());
        let args: Vec<_> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            [
                "--nodisplay",
                "--xml",
                "-Sdisable",
                "-Sqrcode.enable",
                "--prescale=640x480",
                "/dev/video0"
            ]
        );
    }

    #[tokio::test]
    async fn test_reports_decodes_and_misses() {
        let decoder = script_decoder(
            r#"echo 'no symbol' >&2; printf "<symbol type='QR-Code'><data><![CDATA[invoice#42]]></data></symbol>\n"; sleep 30"#,
            Duration::from_millis(100),
        );
        let (callbacks, recorder) = recording_callbacks();

        let handle = decoder
            .start(&CameraConstraints::default(), &SamplingConfig::default(), callbacks)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        decoder.stop(handle).await.unwrap();

        assert_eq!(*recorder.decoded.lock().unwrap(), vec!["invoice#42".to_string()]);
        assert_eq!(*recorder.missed.lock().unwrap(), vec!["no symbol".to_string()]);
    }

    #[tokio::test]
    async fn test_reports_multi_line_payload_as_one_decode() {
        let decoder = script_decoder(
            r#"printf "<symbol type='QR-Code'><data><![CDATA[BEGIN:VCARD\nFN:Jo\nEND:VCARD]]></data></symbol>\n"; sleep 30"#,
            Duration::from_millis(100),
        );
        let (callbacks, recorder) = recording_callbacks();

        let handle = decoder
            .start(&CameraConstraints::default(), &SamplingConfig::default(), callbacks)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        decoder.stop(handle).await.unwrap();

        assert_eq!(
            *recorder.decoded.lock().unwrap(),
            vec!["BEGIN:VCARD\nFN:Jo\nEND:VCARD".to_string()]
        );
    }

    #[tokio::test]
    async fn test_throttles_to_sampling_rate() {
        let decoder = script_decoder(
            r#"for i in 1 2 3 4 5; do printf "<symbol type='QR-Code'><data><![CDATA[$i]]></data></symbol>\n"; done; sleep 30"#,
            Duration::from_millis(100),
        );
        let (callbacks, recorder) = recording_callbacks();
        let sampling = SamplingConfig {
            fps: 1,
            region: None,
        };

        let handle = decoder
            .start(&CameraConstraints::default(), &sampling, callbacks)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        decoder.stop(handle).await.unwrap();

        assert_eq!(*recorder.decoded.lock().unwrap(), vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_immediate_exit_fails_start() {
        let decoder = script_decoder("echo 'device busy' >&2; exit 1", Duration::from_millis(500));
        let (callbacks, _) = recording_callbacks();

        let error = decoder
            .start(&CameraConstraints::default(), &SamplingConfig::default(), callbacks)
            .await
            .err()
            .expect("start fails");

        assert!(format!("{:#}", error).contains("device busy"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_start() {
        let decoder = ZbarDecoder::new("qr2wa-no-such-program", Vec::new(), Duration::ZERO);
        let (callbacks, _) = recording_callbacks();

        let result = decoder
            .start(&CameraConstraints::default(), &SamplingConfig::default(), callbacks)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_exit_after_startup_is_reported_and_stop_is_ok() {
        let decoder = script_decoder("sleep 0.2", Duration::from_millis(50));
        let (callbacks, recorder) = recording_callbacks();

        let handle = decoder
            .start(&CameraConstraints::default(), &SamplingConfig::default(), callbacks)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(recorder.exited.lock().unwrap().len(), 1);
        assert!(decoder.stop(handle).await.is_ok());
    }
}
