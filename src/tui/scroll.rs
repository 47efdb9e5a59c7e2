//! Stable scrolling for list-like panels (spec §4.9.1). Unlike the
//! auto-follow `ScrollState` style built for streaming content, this is
//! a pure recompute: given where the cursor moved to, find the smallest
//! window shift that keeps it visible, and never shift when it doesn't
//! have to.

/// Recomputes the visible window `[start, end)` for `cursor` within
/// `total` items, given the window's prior `offset`. Returns the new
/// offset alongside the window bounds so callers can store it for next
/// time.
pub fn stable_scroll(total: usize, cursor: usize, window_size: usize, offset: usize) -> (usize, usize, usize) {
    let window_size = window_size.max(1);
    let mut offset = offset;

    if cursor < offset {
        offset = cursor;
    } else if cursor >= offset + window_size {
        offset = cursor + 1 - window_size;
    }

    let max_offset = total.saturating_sub(window_size);
    offset = offset.min(max_offset);

    let start = offset;
    let end = (offset + window_size).min(total);
    (start, end, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_scenario_from_spec() {
        let (start, end, offset) = stable_scroll(10, 5, 4, 3);
        assert_eq!((start, end, offset), (3, 7, 3));

        let (start, end, offset) = stable_scroll(10, 7, 4, offset);
        assert_eq!((start, end, offset), (4, 8, 4));

        let (start, end, offset) = stable_scroll(10, 2, 4, offset);
        assert_eq!((start, end, offset), (2, 6, 2));
    }

    #[test]
    fn offset_unchanged_when_cursor_already_visible() {
        let (_, _, offset) = stable_scroll(20, 8, 5, 6);
        assert_eq!(offset, 6);
    }

    #[test]
    fn offset_clamps_to_max_when_total_shrinks() {
        let (start, end, offset) = stable_scroll(3, 2, 5, 10);
        assert_eq!((start, end, offset), (0, 3, 0));
    }

    #[test]
    fn window_never_exceeds_total() {
        let (start, end, _) = stable_scroll(2, 0, 10, 0);
        assert_eq!(end - start, 2);
    }

    #[test]
    fn cursor_at_zero_resets_offset_to_zero() {
        let (start, end, offset) = stable_scroll(50, 0, 10, 20);
        assert_eq!((start, end, offset), (0, 10, 0));
    }
}
