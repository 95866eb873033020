//! # Chunk Merger
//!
//! Reassembles enhanced windows into one waveform. The region shared by two
//! neighbouring windows is crossfaded linearly so chunk boundaries are
//! inaudible.
//!
//! ## Algorithm:
//! 1. Compute each boundary's effective overlap `min(overlap, len_prev, len_cur)`
//!    and from that the output length. Planned windows are always longer than
//!    the overlap, so the effective overlap equals the planned one and the
//!    output is exactly as long as the source
//! 2. Preallocate the output once
//! 3. Copy the first chunk, then for every following chunk blend its head into
//!    the tail already written (`prev * (1 - w) + cur * w`, `w` from 0 to 1
//!    inclusive) and append the rest untouched

/// Enhanced samples for one planned window.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedChunk {
    pub index: usize,
    pub samples: Vec<f32>,
}

/// Effective overlap at each boundary (`result[i]` is between chunk `i` and `i + 1`).
fn boundary_overlaps(chunks: &[EnhancedChunk], overlap: usize) -> Vec<usize> {
    chunks
        .windows(2)
        .map(|pair| {
            let shorter = pair[0].samples.len().min(pair[1].samples.len());
            overlap.min(shorter)
        })
        .collect()
}

/// Merge chunks in the order given.
///
/// Output length is the sum of chunk lengths minus the sum of effective overlaps.
pub fn merge_chunks(chunks: &[EnhancedChunk], overlap: usize) -> Vec<f32> {
    let Some(first) = chunks.first() else {
        return Vec::new();
    };

    let overlaps = boundary_overlaps(chunks, overlap);
    let total_len = chunks.iter().map(|c| c.samples.len()).sum::<usize>()
        - overlaps.iter().sum::<usize>();

    let mut output = vec![0.0f32; total_len];
    output[..first.samples.len()].copy_from_slice(&first.samples);
    let mut cursor = first.samples.len();

    for (chunk, &fade_len) in chunks[1..].iter().zip(overlaps.iter()) {
        let write_start = cursor - fade_len;
        let samples = &chunk.samples;

        for i in 0..fade_len {
            let weight = if fade_len > 1 {
                i as f32 / (fade_len - 1) as f32
            } else {
                0.0
            };
            let prev = output[write_start + i];
            output[write_start + i] = prev * (1.0 - weight) + samples[i] * weight;
        }

        output[cursor..cursor + samples.len() - fade_len].copy_from_slice(&samples[fade_len..]);
        cursor = write_start + samples.len();
    }

    debug_assert_eq!(cursor, total_len);
    output
}
