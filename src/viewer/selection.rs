use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendMode {
    /// The range becomes the whole selection (shift-click)
    Replace,
    /// The range is added to the current selection (ctrl+shift-click)
    Append,
}

/// Selected rows, focus and the anchor range selection extends from.
///
/// All indices address the unfiltered record list. Ranges are computed over
/// the rows currently visible, so a range never picks up filtered-out rows.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    selected: BTreeSet<usize>,
    focus: Option<usize>,
    anchor: Option<usize>,
    dragging: bool,
}

impl SelectionState {
    pub fn focus(&self) -> Option<usize> {
        self.focus
    }

    pub fn anchor(&self) -> Option<usize> {
        self.anchor
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn select(&mut self, index: usize) {
        self.selected.clear();
        self.selected.insert(index);
        self.focus = Some(index);
        self.anchor = Some(index);
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
        self.focus = Some(index);
        self.anchor = Some(index);
    }

    /// Select the visible rows between the anchor and `index`. Without an
    /// anchor this behaves like [`select`](Self::select).
    pub fn extend(&mut self, index: usize, mode: ExtendMode, visible: &[usize]) {
        let Some(anchor) = self.anchor.or(self.focus) else {
            self.select(index);
            return;
        };
        let (low, high) = if anchor <= index { (anchor, index) } else { (index, anchor) };

        if mode == ExtendMode::Replace {
            self.selected.clear();
        }
        self.selected
            .extend(visible.iter().copied().filter(|i| (low..=high).contains(i)));
        // Hidden endpoints still count as picked
        self.selected.insert(index);
        self.selected.insert(anchor);
        self.anchor = Some(anchor);
        self.focus = Some(index);
    }

    pub fn select_all(&mut self, visible: &[usize]) {
        self.selected = visible.iter().copied().collect();
    }

    /// Focus stays where it is
    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
        self.dragging = false;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_focus(&mut self, index: Option<usize>) {
        self.focus = index;
    }

    pub fn start_drag(&mut self, index: usize) {
        self.select(index);
        self.dragging = true;
    }

    pub fn drag_to(&mut self, index: usize, visible: &[usize]) {
        if self.dragging {
            self.extend(index, ExtendMode::Replace, visible);
        }
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    /// `count` rows were evicted from the head of the list
    pub fn shift(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let shift_index = |index: usize| index.checked_sub(count);
        self.selected = self.selected.iter().filter_map(|&i| shift_index(i)).collect();
        self.focus = self.focus.and_then(shift_index);
        self.anchor = self.anchor.and_then(shift_index);
    }
}
