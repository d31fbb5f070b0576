use chrono::Local;
use routine_core::Notifier;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where desktop notifications go, if anywhere.
#[derive(Debug, Clone)]
enum Desktop {
    Osascript(PathBuf),
    NotifySend(PathBuf),
}

/// Prints every notification to stdout and, when a backend is installed,
/// mirrors it as a desktop notification.
#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    desktop: Option<Desktop>,
}

impl TerminalNotifier {
    pub fn new(desktop_notifications: bool) -> Self {
        let desktop = if desktop_notifications {
            detect_desktop()
        } else {
            None
        };
        Self { desktop }
    }

    fn show_desktop(&self, title: &str, body: &str) {
        let Some(desktop) = &self.desktop else {
            return;
        };
        let output = match desktop {
            Desktop::Osascript(bin) => {
                let script = format!(
                    "display notification \"{}\" with title \"{}\"",
                    escape_applescript(body),
                    escape_applescript(title)
                );
                std::process::Command::new(bin).arg("-e").arg(script).output()
            }
            Desktop::NotifySend(bin) => std::process::Command::new(bin)
                .args(["--app-name", "routine", title, body])
                .output(),
        };
        match output {
            Ok(o) if !o.status.success() => {
                let stderr = String::from_utf8_lossy(&o.stderr);
                warn!(%stderr, "desktop notification failed");
            }
            Err(e) => warn!(error = %e, "desktop notification failed"),
            Ok(_) => {}
        }
    }
}

fn detect_desktop() -> Option<Desktop> {
    if cfg!(target_os = "macos") {
        which::which("osascript").ok().map(Desktop::Osascript)
    } else {
        which::which("notify-send").ok().map(Desktop::NotifySend)
    }
}

impl Notifier for TerminalNotifier {
    fn request_permission(&self) -> bool {
        if self.desktop.is_none() {
            info!("no desktop notifier found; reminders print to the terminal only");
        }
        true
    }

    fn show(&self, title: &str, body: &str, tag: &str) {
        println!("[{}] {}: {}", Local::now().format("%H:%M"), title, body);
        info!(tag, title, "notification shown");
        self.show_desktop(title, body);
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
