//! Push-to-talk hotkey using evdev.
//!
//! Watches every keyboard device for the configured combo and sends the
//! press time on each press edge. Releases and key repeats are ignored.

use evdev::{Device, EventType, InputEventKind, Key};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::HotkeyConfig;

/// Resolve a name like "KEY_F9" to an evdev key.
fn resolve_key(name: &str) -> Option<Key> {
    let key = match name {
        "KEY_LEFTMETA" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" => Key::KEY_RIGHTMETA,
        "KEY_LEFTALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTCTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTSHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,
        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,
        _ => {
            warn!("Unknown key name: {name}");
            return None;
        }
    };
    Some(key)
}

/// Pressed keys across all devices, plus whether the combo is currently held.
#[derive(Default)]
struct ComboTracker {
    pressed: HashSet<Key>,
    held: bool,
}

impl ComboTracker {
    /// Apply one key event (0 = release, 1 = press, 2 = repeat).
    /// Returns true on the edge where the combo becomes held.
    fn apply(&mut self, combo: &HashSet<Key>, key: Key, value: i32) -> bool {
        match value {
            1 => {
                self.pressed.insert(key);
            }
            0 => {
                self.pressed.remove(&key);
            }
            _ => return false,
        }

        let now_held = combo.is_subset(&self.pressed);
        let pressed_edge = now_held && !self.held;
        self.held = now_held;
        pressed_edge
    }
}

pub struct HotkeyMonitor {
    combo: HashSet<Key>,
    tracker: Arc<Mutex<ComboTracker>>,
    tx: mpsc::Sender<Instant>,
}

impl HotkeyMonitor {
    /// `None` if no key in the combo could be resolved.
    pub fn new(config: &HotkeyConfig, tx: mpsc::Sender<Instant>) -> Option<Self> {
        let combo: HashSet<Key> = config.combo.iter().filter_map(|s| resolve_key(s)).collect();
        if combo.is_empty() {
            warn!("Hotkey combo {:?} has no usable keys", config.combo);
            return None;
        }
        info!("Push-to-talk combo: {}", config.combo.join("+"));

        Some(Self {
            combo,
            tracker: Arc::new(Mutex::new(ComboTracker::default())),
            tx,
        })
    }

    fn find_keyboards() -> Vec<Device> {
        evdev::enumerate()
            .map(|(_, device)| device)
            .filter(|device| {
                device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
            })
            .inspect(|device| {
                info!(
                    "Found keyboard: {} at {:?}",
                    device.name().unwrap_or("unknown"),
                    device.physical_path()
                )
            })
            .collect()
    }

    async fn monitor_device(
        device: Device,
        combo: HashSet<Key>,
        tracker: Arc<Mutex<ComboTracker>>,
        tx: mpsc::Sender<Instant>,
    ) {
        let name = device.name().unwrap_or("unknown").to_string();
        debug!("Monitoring {name}");

        let mut events = match device.into_event_stream() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Cannot create event stream for {name}: {e}");
                return;
            }
        };

        loop {
            let event = match events.next_event().await {
                Ok(event) => event,
                Err(e) => {
                    warn!("Device {name} disconnected: {e}");
                    break;
                }
            };
            if event.event_type() != EventType::KEY {
                continue;
            }
            let InputEventKind::Key(key) = event.kind() else {
                continue;
            };

            let pressed = tracker
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .apply(&combo, key, event.value());
            if pressed {
                debug!("Push-to-talk pressed");
                let _ = tx.try_send(Instant::now());
            }
        }
    }

    /// Monitor all keyboards until every device disconnects.
    pub async fn run(self) {
        let keyboards = Self::find_keyboards();
        if keyboards.is_empty() {
            warn!(
                "No keyboards readable; push-to-talk disabled. \
                 Add yourself to the 'input' group: sudo usermod -aG input $USER"
            );
            return;
        }

        info!("Monitoring {} keyboard(s)", keyboards.len());

        let handles: Vec<_> = keyboards
            .into_iter()
            .map(|device| {
                tokio::spawn(Self::monitor_device(
                    device,
                    self.combo.clone(),
                    Arc::clone(&self.tracker),
                    self.tx.clone(),
                ))
            })
            .collect();

        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combo() -> HashSet<Key> {
        [Key::KEY_LEFTCTRL, Key::KEY_F9].into_iter().collect()
    }

    #[test]
    fn test_resolve_key() {
        assert_eq!(resolve_key("KEY_F9"), Some(Key::KEY_F9));
        assert_eq!(resolve_key("KEY_LEFTCTRL"), Some(Key::KEY_LEFTCTRL));
        assert_eq!(resolve_key("KEY_NOPE"), None);
    }

    #[test]
    fn test_combo_fires_once_per_press() {
        let combo = combo();
        let mut tracker = ComboTracker::default();

        assert!(!tracker.apply(&combo, Key::KEY_LEFTCTRL, 1));
        assert!(tracker.apply(&combo, Key::KEY_F9, 1));
        // Repeat while held
        assert!(!tracker.apply(&combo, Key::KEY_F9, 2));
        assert!(!tracker.apply(&combo, Key::KEY_F9, 0));
        // Press again without releasing ctrl
        assert!(tracker.apply(&combo, Key::KEY_F9, 1));
    }

    #[test]
    fn test_partial_combo_does_not_fire() {
        let combo = combo();
        let mut tracker = ComboTracker::default();
        assert!(!tracker.apply(&combo, Key::KEY_F9, 1));
        assert!(!tracker.apply(&combo, Key::KEY_F9, 0));
        assert!(!tracker.apply(&combo, Key::KEY_LEFTSHIFT, 1));
    }

    #[test]
    fn test_unresolvable_combo_yields_no_monitor() {
        let (tx, _rx) = mpsc::channel(1);
        let config = HotkeyConfig {
            enabled: true,
            combo: vec!["KEY_NOPE".into()],
        };
        assert!(HotkeyMonitor::new(&config, tx).is_none());
    }
}
