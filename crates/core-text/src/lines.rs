//! Logical-line arithmetic over a flat code-point buffer.
//!
//! A "logical line" is a newline-delimited span of the command line, not a
//! physical screen row; soft wrapping is the renderer's business.

/// Start and one-past-end of the line containing `pos`, excluding the
/// terminating newline.
pub fn line_bounds(buf: &[char], pos: usize) -> (usize, usize) {
    let pos = pos.min(buf.len());
    let start = buf[..pos]
        .iter()
        .rposition(|&c| c == '\n')
        .map_or(0, |i| i + 1);
    let end = buf[pos..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(buf.len(), |i| pos + i);
    (start, end)
}

/// Index of the line containing `pos` (0-based).
pub fn line_index(buf: &[char], pos: usize) -> usize {
    buf[..pos.min(buf.len())].iter().filter(|&&c| c == '\n').count()
}

/// Start offset of line `idx`, or `None` past the last line.
pub fn line_start(buf: &[char], idx: usize) -> Option<usize> {
    if idx == 0 {
        return Some(0);
    }
    let mut seen = 0;
    for (i, &c) in buf.iter().enumerate() {
        if c == '\n' {
            seen += 1;
            if seen == idx {
                return Some(i + 1);
            }
        }
    }
    None
}

/// Target offset for an up/down cursor move that keeps the column relative
/// to the line's indentation: a line indented one level deeper shifts the
/// visual column by one 4-column indent unit.
pub fn offset_for_visual_move(
    buf: &[char],
    indents: &[i32],
    pos: usize,
    up: bool,
) -> Option<usize> {
    let current = line_index(buf, pos);
    let target = if up {
        current.checked_sub(1)?
    } else {
        current + 1
    };

    let current_start = line_start(buf, current)?;
    let target_start = line_start(buf, target)?;
    let (_, target_end) = line_bounds(buf, target_start);

    let indent_at = |off: usize| -> i32 { indents.get(off).copied().unwrap_or(0) };
    let indent_delta = indent_at(target_start) - indent_at(current_start);

    let col = (pos - current_start) as i64 - 4 * indent_delta as i64;
    let col = col.clamp(0, (target_end - target_start) as i64) as usize;
    Some(target_start + col)
}
