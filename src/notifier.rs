//! Desktop notifications via notify-rust (D-Bus).

use notify_rust::Notification;
use tracing::{debug, warn};

use crate::error::Notice;

const SUMMARY: &str = "Health assistant";

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn notice(&self, notice: &Notice) {
        let icon = match notice {
            Notice::NotUnderstood | Notice::RecognitionUnavailable => "audio-input-microphone",
            Notice::GenerationFailed(_) => "dialog-warning",
        };
        self.notify(&notice.to_string(), icon);
    }

    fn notify(&self, body: &str, icon: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {body}");

        if let Err(e) = Notification::new()
            .summary(SUMMARY)
            .body(body)
            .icon(icon)
            .timeout(3000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}
