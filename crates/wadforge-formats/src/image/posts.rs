//! Column posts shared by the Doom patch layouts
//!
//! A column is a run of posts ended by `0xFF`:
//!
//! ```text
//! u8 top, u8 length, [u8 pad], length × u8 index, [u8 pad]
//! ```
//!
//! Tall patches (DeePsea) let a column pass row 254: a `top` that is not
//! greater than the previous post's top is relative to it.

use wadforge_core::buffer::{range_checked, read};
use wadforge_core::{Error, Result};

pub(super) const END_OF_COLUMN: u8 = 0xFF;

/// Longest run written as one post
const MAX_POST: usize = 254;
/// Highest row a post can start at with an absolute top
const MAX_ABSOLUTE_TOP: i64 = 254;

#[derive(Debug, Clone, Copy)]
pub(super) struct PostLayout {
    /// Pad byte before and after each post's pixels
    pub padded: bool,
    /// Relative tops for rows past 254
    pub tall: bool,
}

/// Destination of a decoded column
pub(super) struct Canvas<'a> {
    pub width: usize,
    pub height: usize,
    pub pixels: &'a mut [u8],
    pub mask: &'a mut [u8],
}

fn byte_at(data: &[u8], pos: usize) -> Result<u8> {
    read::u8(data, pos).ok_or_else(|| Error::truncated(pos, 1, 0))
}

/// Draw the column at `offset` into column `x` of `canvas`
pub(super) fn decode_column(data: &[u8], offset: usize, x: usize, layout: PostLayout, canvas: &mut Canvas<'_>) -> Result<()> {
    if offset >= data.len() {
        return Err(Error::out_of_bounds(offset, data.len()).with_context(format!("column {x}")));
    }
    let pad = usize::from(layout.padded);
    let mut pos = offset;
    let mut top: i64 = -1;

    loop {
        let delta = byte_at(data, pos)?;
        if delta == END_OF_COLUMN {
            return Ok(());
        }
        let delta = i64::from(delta);
        top = if layout.tall && delta <= top { top + delta } else { delta };

        let length = usize::from(byte_at(data, pos + 1)?);
        let start = pos + 2 + pad;
        let run = range_checked(data, start, length).map_err(|e| e.with_context(format!("column {x}")))?;

        for (i, &index) in run.iter().enumerate() {
            let row = top as usize + i;
            if row >= canvas.height {
                break;
            }
            let at = row * canvas.width + x;
            canvas.pixels[at] = index;
            canvas.mask[at] = u8::MAX;
        }
        pos = start + length + pad;
    }
}

/// Encoded `top` byte for a post at `row`, emitting empty filler posts
/// when a tall column needs to step forward first
fn post_top(row: usize, last_top: &mut i64, layout: PostLayout, out: &mut Vec<u8>) -> Result<u8> {
    let row = row as i64;
    loop {
        if row <= MAX_ABSOLUTE_TOP && row > *last_top {
            *last_top = row;
            return Ok(row as u8);
        }
        if !layout.tall {
            return Err(Error::invalid_operation(format!(
                "row {row} is past the last addressable row {MAX_ABSOLUTE_TOP}"
            )));
        }
        if *last_top >= 0 {
            let relative = row - *last_top;
            if relative <= (*last_top).min(MAX_ABSOLUTE_TOP) {
                *last_top = row;
                return Ok(relative as u8);
            }
        }
        // empty post at 254, absolute the first time and relative after
        if *last_top < MAX_ABSOLUTE_TOP {
            *last_top = MAX_ABSOLUTE_TOP;
        } else {
            *last_top += MAX_ABSOLUTE_TOP;
        }
        out.extend_from_slice(&[MAX_ABSOLUTE_TOP as u8, 0]);
        if layout.padded {
            out.extend_from_slice(&[0, 0]);
        }
    }
}

/// Encode one column; `None` rows are transparent
pub(super) fn encode_column(column: &[Option<u8>], layout: PostLayout) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut last_top = -1;
    let mut row = 0;

    while row < column.len() {
        if column[row].is_none() {
            row += 1;
            continue;
        }
        let run: Vec<u8> = column[row..]
            .iter()
            .take(MAX_POST)
            .map_while(|pixel| *pixel)
            .collect();

        let top = post_top(row, &mut last_top, layout, &mut out)?;
        out.push(top);
        out.push(run.len() as u8);
        if layout.padded {
            out.push(run[0]);
        }
        out.extend_from_slice(&run);
        if layout.padded {
            out.push(run[run.len() - 1]);
        }
        row += run.len();
    }

    out.push(END_OF_COLUMN);
    Ok(out)
}
