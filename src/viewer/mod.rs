//! Viewer-side state backing a virtualized log list.
//!
//! [`LogsController`] owns the capped record list, the active filters and
//! the selection. Filters are evaluated at query time, so the cap bounds
//! memory while the filters only bound what is shown.

pub mod clipboard;
pub mod filter;
pub mod navigation;
pub mod selection;

use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

use crate::ansi::AnsiDecoder;
use crate::error::ClipboardError;
use crate::log::LogRecord;

pub use clipboard::ClipboardContent;
pub use filter::{FilterMode, MessageFilter, MetadataFilter};
pub use navigation::{AutoScroll, KeyRepeat, NavKey, ScrollDirection, Viewport, auto_scroll};
pub use selection::{ExtendMode, SelectionState};

pub const DEFAULT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerOptions {
    /// Oldest records are evicted beyond this many. `None` keeps everything.
    pub limit: Option<usize>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            limit: Some(DEFAULT_LIMIT),
        }
    }
}

/// What a key press did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Throttled, or nothing to move to
    Ignored,
    FocusMoved(usize),
    SelectionCleared,
    SelectedAll,
    /// The caller should export the selection
    CopyRequested,
}

pub struct LogsController {
    records: VecDeque<LogRecord>,
    options: ViewerOptions,
    message_filter: Option<MessageFilter>,
    metadata_filter: MetadataFilter,
    selection: SelectionState,
    key_repeat: KeyRepeat,
}

impl LogsController {
    pub fn new(options: ViewerOptions) -> Self {
        Self {
            records: VecDeque::new(),
            options,
            message_filter: None,
            metadata_filter: MetadataFilter::default(),
            selection: SelectionState::default(),
            key_repeat: KeyRepeat::default(),
        }
    }

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    /// Append at the tail, then evict from the head down to the limit.
    /// Returns how many records were evicted.
    pub fn append(&mut self, records: impl IntoIterator<Item = LogRecord>) -> usize {
        self.records.extend(records);

        let evicted = match self.options.limit {
            Some(limit) if self.records.len() > limit => {
                let excess = self.records.len() - limit;
                self.records.drain(..excess);
                excess
            }
            _ => 0,
        };

        if evicted > 0 {
            debug!(evicted, retained = self.records.len(), "viewer limit reached");
            self.selection.shift(evicted);
        }
        evicted
    }

    /// Empty the list, selection and focus
    pub fn clear(&mut self) {
        self.records.clear();
        self.selection.reset();
        self.key_repeat.release();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &VecDeque<LogRecord> {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&LogRecord> {
        self.records.get(index)
    }

    // Filtering

    pub fn set_message_filter(&mut self, filter: Option<MessageFilter>) {
        self.message_filter = filter.filter(|filter| !filter.is_empty());
    }

    pub fn set_metadata_filter(&mut self, filter: MetadataFilter) {
        self.metadata_filter = filter;
    }

    pub fn clear_filters(&mut self) {
        self.message_filter = None;
        self.metadata_filter = MetadataFilter::default();
    }

    pub fn message_filter(&self) -> Option<&MessageFilter> {
        self.message_filter.as_ref()
    }

    pub fn metadata_filter(&self) -> &MetadataFilter {
        &self.metadata_filter
    }

    pub fn is_visible(&self, record: &LogRecord) -> bool {
        self.message_filter.as_ref().is_none_or(|filter| filter.matches(record))
            && self.metadata_filter.matches(record)
    }

    /// Indices (into the unfiltered list) of the records passing the filters
    pub fn visible_indices(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.is_visible(record))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn visible_records(&self) -> Vec<&LogRecord> {
        self.records.iter().filter(|record| self.is_visible(record)).collect()
    }

    // Selection

    pub fn select(&mut self, index: usize) {
        if index < self.records.len() {
            self.selection.select(index);
        }
    }

    pub fn toggle(&mut self, index: usize) {
        if index < self.records.len() {
            self.selection.toggle(index);
        }
    }

    pub fn extend_selection(&mut self, index: usize, mode: ExtendMode) {
        if index < self.records.len() {
            let visible = self.visible_indices();
            self.selection.extend(index, mode, &visible);
        }
    }

    pub fn select_all(&mut self) {
        let visible = self.visible_indices();
        self.selection.select_all(&visible);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selection.is_selected(index)
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.selection.selected().collect()
    }

    /// Selected records that are currently visible, oldest first
    pub fn selected_records(&self) -> Vec<&LogRecord> {
        self.selection
            .selected()
            .filter_map(|i| self.records.get(i))
            .filter(|record| self.is_visible(record))
            .collect()
    }

    pub fn focus(&self) -> Option<usize> {
        self.selection.focus()
    }

    pub fn start_drag(&mut self, index: usize) {
        if index < self.records.len() {
            self.selection.start_drag(index);
        }
    }

    pub fn drag_to(&mut self, index: usize) {
        if index < self.records.len() {
            let visible = self.visible_indices();
            self.selection.drag_to(index, &visible);
        }
    }

    pub fn end_drag(&mut self) {
        self.selection.end_drag();
    }

    /// Scrolling to apply while a drag is in progress
    pub fn auto_scroll(&self, pointer: f64, viewport: Viewport) -> Option<AutoScroll> {
        if !self.selection.is_dragging() {
            return None;
        }
        auto_scroll(pointer, viewport)
    }

    // Keyboard

    pub fn handle_key(&mut self, key: NavKey, shift: bool, now: Instant) -> KeyAction {
        if !self.key_repeat.accept(key, now) {
            return KeyAction::Ignored;
        }

        match key {
            NavKey::Escape => {
                self.selection.clear();
                KeyAction::SelectionCleared
            }
            NavKey::SelectAll => {
                self.select_all();
                KeyAction::SelectedAll
            }
            NavKey::Copy => KeyAction::CopyRequested,
            NavKey::Up | NavKey::Down | NavKey::Home | NavKey::End => {
                let visible = self.visible_indices();
                let Some(target) = self.navigation_target(key, &visible) else {
                    return KeyAction::Ignored;
                };
                if shift {
                    self.selection.extend(target, ExtendMode::Replace, &visible);
                } else {
                    self.selection.select(target);
                }
                KeyAction::FocusMoved(target)
            }
        }
    }

    pub fn key_released(&mut self) {
        self.key_repeat.release();
    }

    fn navigation_target(&self, key: NavKey, visible: &[usize]) -> Option<usize> {
        let first = visible.first().copied();
        let last = visible.last().copied();
        let focus = self.selection.focus();

        match key {
            NavKey::Home => first,
            NavKey::End => last,
            NavKey::Down => match focus {
                None => first,
                Some(focus) => visible.iter().copied().find(|&i| i > focus),
            },
            NavKey::Up => match focus {
                None => last,
                Some(focus) => visible.iter().rev().copied().find(|&i| i < focus),
            },
            _ => None,
        }
    }

    // Export

    pub fn export_selection(&self, decoder: &mut AnsiDecoder) -> ClipboardContent {
        clipboard::export_records(&self.selected_records(), decoder)
    }

    pub fn copy_selection(&self, decoder: &mut AnsiDecoder) -> Result<ClipboardContent, ClipboardError> {
        if self.selected_records().is_empty() {
            return Err(ClipboardError::EmptySelection);
        }
        let content = self.export_selection(decoder);
        clipboard::write_clipboard(&content)?;
        Ok(content)
    }
}

impl Default for LogsController {
    fn default() -> Self {
        Self::new(ViewerOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Metadata;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn record(n: usize, message: &str) -> LogRecord {
        let date = Utc.with_ymd_and_hms(2024, 10, 17, 12, 0, 0).unwrap() + chrono::Duration::seconds(n as i64);
        LogRecord::new(n.to_string(), date, message)
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<LogRecord> {
        range.map(|n| record(n, &format!("line {}", n))).collect()
    }

    fn ids(records: &[&LogRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_fifo_cap_keeps_last_records_in_order() {
        let mut controller = LogsController::new(ViewerOptions { limit: Some(3) });
        controller.append(numbered(0..2));
        let evicted = controller.append(numbered(2..7));
        assert_eq!(evicted, 4);
        let kept: Vec<&str> = controller.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(kept, vec!["4", "5", "6"]);
    }

    #[test]
    fn test_unlimited_keeps_everything() {
        let mut controller = LogsController::new(ViewerOptions { limit: None });
        controller.append(numbered(0..50));
        assert_eq!(controller.len(), 50);
    }

    #[test]
    fn test_filters_apply_at_query_time() {
        let mut controller = LogsController::new(ViewerOptions { limit: Some(10) });
        controller.append(vec![
            record(0, "GET /health").with_metadata(vec![Metadata::new("instance", "web-1")]),
            record(1, "POST /login failed").with_metadata(vec![Metadata::new("instance", "web-2")]),
            record(2, "GET /login").with_metadata(vec![Metadata::new("instance", "web-1")]),
        ]);

        controller.set_message_filter(Some(MessageFilter::loose("login")));
        assert_eq!(controller.visible_indices(), vec![1, 2]);

        controller.set_metadata_filter(MetadataFilter::new(vec![Metadata::new("instance", "web-1")]));
        assert_eq!(ids(&controller.visible_records()), vec!["2"]);

        controller.clear_filters();
        assert_eq!(controller.visible_indices(), vec![0, 1, 2]);
        assert_eq!(controller.len(), 3);
    }

    #[test]
    fn test_eviction_shifts_focus_and_selection() {
        let mut controller = LogsController::new(ViewerOptions { limit: Some(4) });
        controller.append(numbered(0..4));
        controller.select(1);
        controller.extend_selection(3, ExtendMode::Replace);

        controller.append(numbered(4..6));
        assert_eq!(controller.selected_indices(), vec![0, 1]);
        assert_eq!(controller.focus(), Some(1));
        assert_eq!(ids(&controller.selected_records()), vec!["2", "3"]);

        controller.append(numbered(6..8));
        assert_eq!(controller.focus(), None);
        assert!(controller.selected_indices().is_empty());
    }

    #[test]
    fn test_clear_resets_selection_and_focus() {
        let mut controller = LogsController::default();
        controller.append(numbered(0..3));
        controller.select(2);
        controller.clear();
        assert!(controller.is_empty());
        assert_eq!(controller.focus(), None);
        assert!(controller.selected_indices().is_empty());
    }

    #[test]
    fn test_keyboard_navigation_over_visible_rows() {
        let mut controller = LogsController::default();
        let info = || vec![Metadata::new("level", "info")];
        controller.append(vec![
            record(0, "a").with_metadata(info()),
            record(1, "skip").with_metadata(vec![Metadata::new("level", "debug")]),
            record(2, "b").with_metadata(info()),
            record(3, "c").with_metadata(info()),
        ]);
        controller.set_metadata_filter(MetadataFilter::new(info()));
        let start = Instant::now();

        assert_eq!(controller.handle_key(NavKey::Down, false, start), KeyAction::FocusMoved(0));
        controller.key_released();
        assert_eq!(
            controller.handle_key(NavKey::Down, false, start + Duration::from_millis(1)),
            KeyAction::FocusMoved(2)
        );
        controller.key_released();
        assert_eq!(
            controller.handle_key(NavKey::Up, false, start + Duration::from_millis(2)),
            KeyAction::FocusMoved(0)
        );
        assert_eq!(
            controller.handle_key(NavKey::End, true, start + Duration::from_millis(3)),
            KeyAction::FocusMoved(3)
        );
        assert_eq!(controller.selected_indices(), vec![0, 2, 3]);

        assert_eq!(
            controller.handle_key(NavKey::Escape, false, start + Duration::from_millis(4)),
            KeyAction::SelectionCleared
        );
        assert!(controller.selected_indices().is_empty());
        assert_eq!(controller.focus(), Some(3));
    }

    #[test]
    fn test_held_arrow_is_throttled() {
        let mut controller = LogsController::default();
        controller.append(numbered(0..10));
        let start = Instant::now();

        assert_eq!(controller.handle_key(NavKey::Down, false, start), KeyAction::FocusMoved(0));
        assert_eq!(
            controller.handle_key(NavKey::Down, false, start + Duration::from_millis(50)),
            KeyAction::Ignored
        );
        assert_eq!(
            controller.handle_key(NavKey::Down, false, start + Duration::from_millis(300)),
            KeyAction::FocusMoved(1)
        );
        assert_eq!(
            controller.handle_key(NavKey::Down, false, start + Duration::from_millis(310)),
            KeyAction::Ignored
        );
    }

    #[test]
    fn test_auto_scroll_only_while_dragging() {
        let mut controller = LogsController::default();
        controller.append(numbered(0..5));
        let viewport = Viewport { top: 0.0, bottom: 100.0 };
        assert_eq!(controller.auto_scroll(150.0, viewport), None);

        controller.start_drag(1);
        let scroll = controller.auto_scroll(150.0, viewport).unwrap();
        assert_eq!(scroll.direction, ScrollDirection::Down);
        controller.drag_to(3);
        controller.end_drag();
        assert_eq!(controller.selected_indices(), vec![1, 2, 3]);
        assert_eq!(controller.auto_scroll(150.0, viewport), None);
    }

    #[test]
    fn test_export_only_visible_selected_rows() {
        let mut controller = LogsController::default();
        controller.append(vec![record(0, "keep"), record(1, "drop"), record(2, "keep too")]);
        controller.select_all();
        controller.set_message_filter(Some(MessageFilter::loose("keep")));

        let content = controller.export_selection(&mut AnsiDecoder::default());
        insta::assert_snapshot!(content.text, @r"
        2024-10-17T12:00:00.000Z keep
        2024-10-17T12:00:02.000Z keep too
        ");
    }

    #[test]
    fn test_copy_with_empty_selection_fails() {
        let controller = LogsController::default();
        let result = controller.copy_selection(&mut AnsiDecoder::default());
        assert!(matches!(result, Err(ClipboardError::EmptySelection)));
    }
}
