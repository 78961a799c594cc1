use std::io::BufRead;
use tokio::sync::mpsc;

/// Forward terminal input lines to the application loop
///
/// Reads on a dedicated thread, since a blocking stdin read inside the runtime
/// would hold up shutdown. The thread ends when stdin closes or the receiver is
/// dropped; the closed channel is how the application learns input is over.
pub fn spawn_stdin_reader(tx: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    tracing::debug!("Input line: {:?}", line);
                    if tx.blocking_send(line).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    return;
                }
            }
        }

        tracing::debug!("Stdin closed");
    });
}
