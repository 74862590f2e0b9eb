use std::{fs, path::Path};

use ahash::AHashMap;

use crate::HarnessError;

/// Whether every line of `actual` is accounted for in `reference`.
///
/// Lines are compared as a multiset of raw bytes: each reference line can
/// account for one actual line, so duplicates in `actual` need as many copies
/// in `reference`. Reference lines missing from `actual` do not fail the check.
pub fn contains(reference: &Path, actual: &Path) -> Result<bool, HarnessError> {
    let reference = read(reference)?;
    let actual = read(actual)?;
    Ok(unmatched(&reference, &actual).is_empty())
}

pub fn lines_contained(reference: &str, actual: &str) -> bool {
    unmatched(reference.as_bytes(), actual.as_bytes()).is_empty()
}

/// Lines of `actual` left over once each has consumed a matching reference line.
pub fn unmatched_lines<'a>(reference: &str, actual: &'a str) -> Vec<&'a str> {
    actual
        .lines()
        .zip(split_lines(actual.as_bytes()))
        .scan(counts(reference.as_bytes()), |available, (line, raw)| {
            Some(consume(available, raw).then_some(line))
        })
        .flatten()
        .collect()
}

fn unmatched<'a>(reference: &[u8], actual: &'a [u8]) -> Vec<&'a [u8]> {
    let mut available = counts(reference);
    split_lines(actual)
        .filter(|line| consume(&mut available, line))
        .collect()
}

/// Takes one copy of `line` from `available`; `true` when none was left.
fn consume(available: &mut AHashMap<&[u8], usize>, line: &[u8]) -> bool {
    match available.get_mut(line) {
        Some(count) if *count > 0 => {
            *count -= 1;
            false
        }
        _ => true,
    }
}

fn counts(text: &[u8]) -> AHashMap<&[u8], usize> {
    let mut available = AHashMap::new();
    for line in split_lines(text) {
        *available.entry(line).or_insert(0) += 1;
    }
    available
}

/// Splits on `\n` like [`str::lines`], dropping a trailing `\r` and the empty
/// piece after a final newline.
fn split_lines(text: &[u8]) -> impl Iterator<Item = &[u8]> {
    let body = text.strip_suffix(b"\n").unwrap_or(text);
    let pieces = (!text.is_empty()).then(|| body.split(|&b| b == b'\n'));
    pieces
        .into_iter()
        .flatten()
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

fn read(path: &Path) -> Result<Vec<u8>, HarnessError> {
    fs::read(path).map_err(|e| HarnessError::io_at(path, e))
}
