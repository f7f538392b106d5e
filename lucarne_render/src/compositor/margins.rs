// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Splitting a window into frame margins and body.

use lucarne_core::geom::{Margins, Rect};

/// A window cut into the parts painted at frame opacity and the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FramePieces {
    /// Top, bottom, left and right margins. Any of them may be empty.
    pub(crate) margins: [Rect; 4],
    /// What is left inside the margins. May be empty.
    pub(crate) body: Rect,
}

/// Cuts `geometry` along `extents`.
///
/// Margins are sanitized top, bottom, left, right: each is clamped to what
/// the previous ones left of the window, so overlapping margins never exceed
/// the window and the pieces never overlap.
pub(crate) fn frame_pieces(geometry: Rect, extents: Margins) -> FramePieces {
    let w = i32::try_from(geometry.width()).unwrap_or(i32::MAX);
    let h = i32::try_from(geometry.height()).unwrap_or(i32::MAX);
    let top = extents.top.clamp(0, h);
    let bottom = extents.bottom.clamp(0, h - top);
    let left = extents.left.clamp(0, w);
    let right = extents.right.clamp(0, w - left);

    let Rect { x1, y1, x2, y2 } = geometry;
    let (inner_y1, inner_y2) = (y1 + top, y2 - bottom);
    FramePieces {
        margins: [
            Rect::new(x1, y1, x2, inner_y1),
            Rect::new(x1, inner_y2, x2, y2),
            Rect::new(x1, inner_y1, x1 + left, inner_y2),
            Rect::new(x2 - right, inner_y1, x2, inner_y2),
        ],
        body: Rect::new(x1 + left, inner_y1, x2 - right, inner_y2),
    }
}

#[cfg(test)]
mod tests {
    use lucarne_core::region::Region;

    use super::*;

    #[test]
    fn pieces_tile_the_window() {
        let g = Rect::new(10, 10, 110, 90);
        let p = frame_pieces(g, Margins::new(2, 3, 20, 4));
        assert_eq!(p.margins[0], Rect::new(10, 10, 110, 30));
        assert_eq!(p.margins[1], Rect::new(10, 86, 110, 90));
        assert_eq!(p.margins[2], Rect::new(10, 30, 12, 86));
        assert_eq!(p.margins[3], Rect::new(107, 30, 110, 86));
        assert_eq!(p.body, Rect::new(12, 30, 107, 86));

        let total: u64 = p.margins.iter().map(|r| r.area()).sum::<u64>() + p.body.area();
        assert_eq!(total, g.area(), "pieces do not overlap");
        let union = Region::from_rects(&[p.margins[0], p.margins[1], p.margins[2], p.margins[3], p.body]);
        assert_eq!(union, Region::from_rect(g));
    }

    #[test]
    fn oversized_margins_are_clamped_in_order() {
        let g = Rect::new(0, 0, 20, 10);
        let p = frame_pieces(g, Margins::new(15, 15, 8, 8));
        assert_eq!(p.margins[0].height(), 8, "top keeps what it asked for");
        assert_eq!(p.margins[1].height(), 2, "bottom gets the rest");
        assert_eq!(p.margins[2].width(), 15);
        assert_eq!(p.margins[3].width(), 5);
        assert!(p.body.is_empty());
    }

    #[test]
    fn negative_margins_count_as_zero() {
        let g = Rect::new(0, 0, 20, 10);
        let p = frame_pieces(g, Margins::new(-4, 0, -1, 0));
        assert!(p.margins.iter().all(|m| m.is_empty()));
        assert_eq!(p.body, g);
    }
}
