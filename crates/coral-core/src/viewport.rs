//! Windowed viewport over the merged message view.
//!
//! The renderer must never materialize the whole history: given a scroll
//! position, a viewport height and a per-row size estimate, the viewport
//! computes the minimal contiguous index range that covers the screen plus
//! an overscan margin. The range size depends only on the viewport
//! geometry, never on the number of rows.
//!
//! Auto-scroll follows an incoming stream only while the user is already
//! near the bottom edge; a manual scroll-back is never fought.

use std::ops::Range;

/// Extra rows materialized outside the viewport in each direction.
pub const OVERSCAN_ROWS: usize = 6;

/// Estimated height of one message row, in terminal lines.
pub const DEFAULT_ROW_ESTIMATE: usize = 3;

/// Distance from the bottom edge, in lines, still counted as "at the bottom".
const BOTTOM_THRESHOLD: usize = 3;

/// Scroll state and window computation for an unbounded row sequence.
#[derive(Debug, Clone)]
pub struct Viewport {
    height: usize,
    row_estimate: usize,
    overscan: usize,
    scroll_top: usize,
    anchored: bool,
}

impl Viewport {
    /// Create a viewport with the default row estimate and overscan.
    #[must_use]
    pub fn new(height: usize) -> Self {
        Self::with_geometry(height, DEFAULT_ROW_ESTIMATE, OVERSCAN_ROWS)
    }

    /// Create a viewport with explicit geometry.
    ///
    /// `row_estimate` is clamped to at least one line.
    #[must_use]
    pub fn with_geometry(height: usize, row_estimate: usize, overscan: usize) -> Self {
        Self {
            height,
            row_estimate: row_estimate.max(1),
            overscan,
            scroll_top: 0,
            anchored: true,
        }
    }

    /// Current scroll offset from the top, in lines.
    #[must_use]
    pub const fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Viewport height, in lines.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Per-row line estimate.
    #[must_use]
    pub const fn row_estimate(&self) -> usize {
        self.row_estimate
    }

    /// Adjust to a new terminal size, keeping the scroll position valid.
    pub fn resize(&mut self, height: usize, rows: usize) {
        self.height = height;
        self.scroll_top = self.scroll_top.min(self.max_scroll(rows));
    }

    /// Estimated total content height for `rows` rows, in lines.
    #[must_use]
    pub const fn total_height(&self, rows: usize) -> usize {
        rows * self.row_estimate
    }

    /// Largest valid scroll offset for `rows` rows.
    #[must_use]
    pub const fn max_scroll(&self, rows: usize) -> usize {
        self.total_height(rows).saturating_sub(self.height)
    }

    /// The minimal contiguous index range whose estimated offsets cover the
    /// current scroll position, widened by the overscan margin on each side.
    ///
    /// The range length is bounded by the viewport geometry alone:
    /// `ceil(height / row_estimate) + 2 * overscan + 1` rows at most,
    /// whether the history holds ten rows or a hundred thousand.
    #[must_use]
    pub fn visible_range(&self, rows: usize) -> Range<usize> {
        if rows == 0 || self.height == 0 {
            return 0..0;
        }
        let first_visible = self.scroll_top / self.row_estimate;
        let last_visible = (self.scroll_top + self.height - 1) / self.row_estimate;
        let start = first_visible.saturating_sub(self.overscan).min(rows);
        let end = last_visible.saturating_add(self.overscan + 1).min(rows);
        start..end
    }

    /// Estimated top offset of a row, in lines.
    #[must_use]
    pub const fn offset_of(&self, index: usize) -> usize {
        index * self.row_estimate
    }

    /// Whether the viewport is within the bottom threshold.
    #[must_use]
    pub const fn is_near_bottom(&self, rows: usize) -> bool {
        self.scroll_top + self.height + BOTTOM_THRESHOLD >= self.total_height(rows)
    }

    /// Capture whether the viewport is near the bottom, before content grows.
    pub fn record_anchor(&mut self, rows: usize) {
        self.anchored = self.is_near_bottom(rows);
    }

    /// After content grew: scroll to the new bottom only if the last
    /// [`Self::record_anchor`] observed the viewport near the bottom.
    pub fn follow(&mut self, rows: usize) {
        if self.anchored {
            self.scroll_top = self.max_scroll(rows);
        }
    }

    /// Jump to the bottom unconditionally (new submission, conversation
    /// switch).
    pub fn scroll_to_bottom(&mut self, rows: usize) {
        self.scroll_top = self.max_scroll(rows);
        self.anchored = true;
    }

    /// Scroll towards older rows.
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_top = self.scroll_top.saturating_sub(lines);
    }

    /// Scroll towards newer rows.
    pub fn scroll_down(&mut self, lines: usize, rows: usize) {
        self.scroll_top = self
            .scroll_top
            .saturating_add(lines)
            .min(self.max_scroll(rows));
    }
}
