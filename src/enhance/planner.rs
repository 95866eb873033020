//! # Chunk Planner
//!
//! Splits a long recording into overlapping windows so that the model never
//! sees more than `max_chunk` samples at once.
//!
//! ## Window Layout:
//! ```text
//! [0 ........ C)
//!         [C-O ........ 2C-O)
//!                   [2C-2O ...... N)
//! ```
//! Consecutive windows share exactly `overlap` samples; the final window may
//! be shorter than `C`. The overlap is clamped to at most `C / 4`, which keeps
//! every step at least `3C / 4` samples long.

/// One half-open window `[start, end)` into the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ChunkWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// The windows covering `[0, N)` plus the effective overlap the merger must use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub windows: Vec<ChunkWindow>,
    pub overlap: usize,
}

impl ChunkPlan {
    pub fn is_chunked(&self) -> bool {
        self.windows.len() > 1
    }
}

/// Plan the windows for `total` samples.
///
/// ## Parameters:
/// - **total**: sample count `N`
/// - **max_chunk**: `C`; `None` (or 0) disables chunking
/// - **overlap**: requested `O`, clamped to `C / 4`
///
/// `total == 0` produces a single empty window `[0, 0)`.
pub fn plan_chunks(total: usize, max_chunk: Option<usize>, overlap: usize) -> ChunkPlan {
    let max_chunk = match max_chunk {
        Some(c) if c > 0 => c,
        _ => {
            return ChunkPlan {
                windows: vec![ChunkWindow { index: 0, start: 0, end: total }],
                overlap: 0,
            }
        }
    };

    let overlap = overlap.min(max_chunk / 4);

    if total <= max_chunk {
        return ChunkPlan {
            windows: vec![ChunkWindow { index: 0, start: 0, end: total }],
            overlap,
        };
    }

    let mut windows = Vec::with_capacity(total / (max_chunk - overlap) + 1);
    let mut start = 0;
    loop {
        let end = (start + max_chunk).min(total);
        windows.push(ChunkWindow { index: windows.len(), start, end });
        if end == total {
            break;
        }
        start = end - overlap;
    }

    ChunkPlan { windows, overlap }
}
