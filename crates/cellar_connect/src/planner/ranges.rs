//! Range arithmetic for the split planner: byte-wise midpoints, artificial
//! bisection, containment tests, and binning into splits.

use cellar_store::RowRange;
use rand::seq::SliceRandom;
use rand::thread_rng;

/// One planner output unit: a preferred host plus the scan ranges one task
/// executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletSplitMetadata {
    pub host: String,
    pub ranges: Vec<RowRange>,
}

/// Byte-wise midpoint of two row keys.
///
/// Bytes are compared pairwise in ascending order; an odd difference at one
/// position carries 128 into the next. Inputs of unequal length are
/// zero-extended to the longer length, and each output byte saturates at
/// 255, so the result always has the common length and sorts between the
/// inputs.
pub fn midpoint(start: &[u8], end: &[u8]) -> Vec<u8> {
    let len = start.len().max(end.len());
    let mut out = vec![0u8; len];
    let mut carry = 0u32;
    for (position, slot) in out.iter_mut().enumerate() {
        let mut low = u32::from(*start.get(position).unwrap_or(&0));
        let mut high = u32::from(*end.get(position).unwrap_or(&0));
        if low > high {
            std::mem::swap(&mut low, &mut high);
        }
        let mid = (high - low) / 2 + low + carry;
        carry = if (high - low) % 2 == 1 { 128 } else { 0 };
        *slot = mid.min(255) as u8;
    }
    out
}

/// Apply `levels` rounds of midpoint bisection to `ranges`.
///
/// Every round bisects the whole working set, including sub-ranges
/// produced by earlier rounds, so one input range yields up to
/// `2^levels` sub-ranges. Unbounded endpoints are clamped to the table's
/// first/last indexed row ids (inclusively) before bisecting; a range
/// whose clamped endpoints coincide passes through unchanged.
pub fn generate_artificial_splits(
    first_row: &[u8],
    last_row: &[u8],
    levels: u32,
    ranges: Vec<RowRange>,
) -> Vec<RowRange> {
    if levels == 0 {
        return ranges;
    }

    let mut bisected = Vec::with_capacity(ranges.len() * 2);
    for range in ranges {
        let (start, start_inclusive) = match range.start {
            Some(start) => (start, range.start_inclusive),
            None => (first_row.to_vec(), true),
        };
        let (end, end_inclusive) = match range.end {
            Some(end) => (end, range.end_inclusive),
            None => (last_row.to_vec(), true),
        };
        if start == end {
            bisected.push(RowRange::new(
                Some(start),
                start_inclusive,
                Some(end),
                end_inclusive,
            ));
            continue;
        }
        let mid = midpoint(&start, &end);
        bisected.push(RowRange::new(
            Some(start),
            start_inclusive,
            Some(mid.clone()),
            false,
        ));
        bisected.push(RowRange::new(Some(mid), true, Some(end), end_inclusive));
    }

    generate_artificial_splits(first_row, last_row, levels - 1, bisected)
}

/// True when `row` lies inside any of `ranges`.
pub fn in_any_range(row: &[u8], ranges: &[RowRange]) -> bool {
    ranges.iter().any(|range| range.contains(row))
}

/// Shuffle `ranges` and bin them `ranges_per_split` at a time into splits
/// pinned to `host`.
pub fn bin_ranges(host: &str, ranges_per_split: usize, mut ranges: Vec<RowRange>) -> Vec<TabletSplitMetadata> {
    ranges.shuffle(&mut thread_rng());
    ranges
        .chunks(ranges_per_split.max(1))
        .map(|chunk| TabletSplitMetadata {
            host: host.to_string(),
            ranges: chunk.to_vec(),
        })
        .collect()
}
