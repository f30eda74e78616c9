//! Boot button long-press detection
//!
//! The caller samples the button level on a fixed cadence (50 ms on the
//! device) and feeds each sample with the bus clock. A hold reports one long
//! press once it crosses the threshold, however long it lasts.

use uplink_core::event_bus::{button, ButtonInfo};
use uplink_core::{Event, EventSource};

/// Hold time that counts as a long press
pub const DEFAULT_LONG_PRESS_MS: u32 = 1000;

/// Suggested sampling cadence
pub const SCAN_INTERVAL_MS: u64 = 50;

/// What a sample revealed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    LongPress { held_ms: u32 },
    Released { held_ms: u32 },
}

impl ButtonAction {
    /// Bus event announcing this action
    pub fn to_event(self, button_id: u8) -> Event {
        let (id, held_ms) = match self {
            ButtonAction::LongPress { held_ms } => (button::LONG_PRESS, held_ms),
            ButtonAction::Released { held_ms } => (button::RELEASED, held_ms),
        };
        let info = ButtonInfo {
            button_id,
            duration_ms: held_ms,
        };
        Event::with_payload(id, EventSource::BUTTON, &info)
            .unwrap_or_else(|_| Event::new(id, EventSource::BUTTON))
    }
}

/// Debounced long-press detector for one button
#[derive(Debug, Clone)]
pub struct ButtonMonitor {
    long_press_ms: u32,
    pressed_since: Option<u32>,
    long_press_reported: bool,
}

impl Default for ButtonMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_LONG_PRESS_MS)
    }
}

impl ButtonMonitor {
    pub fn new(long_press_ms: u32) -> Self {
        Self {
            long_press_ms: long_press_ms.max(1),
            pressed_since: None,
            long_press_reported: false,
        }
    }

    pub fn long_press_ms(&self) -> u32 {
        self.long_press_ms
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_since.is_some()
    }

    /// Feed one sample of the button level
    pub fn sample(&mut self, pressed: bool, now_ms: u32) -> Option<ButtonAction> {
        match (pressed, self.pressed_since) {
            (true, None) => {
                self.pressed_since = Some(now_ms);
                self.long_press_reported = false;
                None
            }
            (true, Some(since)) => {
                let held_ms = now_ms.wrapping_sub(since);
                if held_ms >= self.long_press_ms && !self.long_press_reported {
                    self.long_press_reported = true;
                    tracing::info!("Button long press detected ({} ms)", held_ms);
                    Some(ButtonAction::LongPress { held_ms })
                } else {
                    None
                }
            }
            (false, Some(since)) => {
                let held_ms = now_ms.wrapping_sub(since);
                self.pressed_since = None;
                self.long_press_reported = false;
                tracing::debug!("Button released (held for {} ms)", held_ms);
                Some(ButtonAction::Released { held_ms })
            }
            (false, None) => None,
        }
    }
}
