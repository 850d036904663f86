//! Keyboard repeat throttling and drag auto-scroll timing.

use std::time::{Duration, Instant};

/// Held keys start repeating after this delay
pub const REPEAT_INITIAL_DELAY: Duration = Duration::from_millis(300);
/// Minimum time between two repeated moves
pub const REPEAT_INTERVAL: Duration = Duration::from_millis(40);

pub const AUTO_SCROLL_MIN_PERIOD: Duration = Duration::from_millis(16);
pub const AUTO_SCROLL_MAX_PERIOD: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavKey {
    Up,
    Down,
    Home,
    End,
    Escape,
    SelectAll,
    Copy,
}

impl NavKey {
    /// Only single-row moves repeat while held
    pub fn repeats(&self) -> bool {
        matches!(self, NavKey::Up | NavKey::Down)
    }
}

/// Low-pass on key repeat so a held arrow cannot outrun the list layout
#[derive(Debug, Default, Clone)]
pub struct KeyRepeat {
    held: Option<(NavKey, Instant)>,
    last_move: Option<Instant>,
}

impl KeyRepeat {
    /// Whether a press of `key` at `now` should act
    pub fn accept(&mut self, key: NavKey, now: Instant) -> bool {
        if !key.repeats() {
            return true;
        }
        match self.held {
            Some((held, pressed_at)) if held == key => {
                if now.duration_since(pressed_at) < REPEAT_INITIAL_DELAY {
                    return false;
                }
                let since_last = self.last_move.map(|last| now.duration_since(last));
                if since_last.is_some_and(|elapsed| elapsed < REPEAT_INTERVAL) {
                    return false;
                }
                self.last_move = Some(now);
                true
            }
            _ => {
                self.held = Some((key, now));
                self.last_move = Some(now);
                true
            }
        }
    }

    pub fn release(&mut self) {
        self.held = None;
        self.last_move = None;
    }
}

/// Vertical bounds of the visible list, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoScroll {
    pub direction: ScrollDirection,
    /// Time between two one-row scroll steps
    pub period: Duration,
}

/// Scrolling speed grows with the distance between the pointer and the
/// viewport edge. `None` while the pointer is inside the viewport.
pub fn auto_scroll(pointer: f64, viewport: Viewport) -> Option<AutoScroll> {
    let (direction, distance) = if pointer < viewport.top {
        (ScrollDirection::Up, viewport.top - pointer)
    } else if pointer > viewport.bottom {
        (ScrollDirection::Down, pointer - viewport.bottom)
    } else {
        return None;
    };

    let period_ms = (1000.0 / distance).clamp(
        AUTO_SCROLL_MIN_PERIOD.as_millis() as f64,
        AUTO_SCROLL_MAX_PERIOD.as_millis() as f64,
    );
    Some(AutoScroll {
        direction,
        period: Duration::from_millis(period_ms.round() as u64),
    })
}
