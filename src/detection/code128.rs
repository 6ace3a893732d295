//! Scan-line Code 128 decoder.
//!
//! Rows of the grayscale image are split into alternating bar/space runs,
//! each six-run group is matched against the symbol table by normalized
//! width, and a candidate is accepted only if the mod-103 check symbol and
//! the stop pattern both verify.

use image::GrayImage;

/// Bar/space widths in modules for symbol values 0..=105. Index 106 holds the
/// first six elements of the stop pattern (the trailing 2-module bar is
/// checked separately).
pub const PATTERNS: [[u8; 6]; 107] = [
    [2, 1, 2, 2, 2, 2], [2, 2, 2, 1, 2, 2], [2, 2, 2, 2, 2, 1], [1, 2, 1, 2, 2, 3],
    [1, 2, 1, 3, 2, 2], [1, 3, 1, 2, 2, 2], [1, 2, 2, 2, 1, 3], [1, 2, 2, 3, 1, 2],
    [1, 3, 2, 2, 1, 2], [2, 2, 1, 2, 1, 3], [2, 2, 1, 3, 1, 2], [2, 3, 1, 2, 1, 2],
    [1, 1, 2, 2, 3, 2], [1, 2, 2, 1, 3, 2], [1, 2, 2, 2, 3, 1], [1, 1, 3, 2, 2, 2],
    [1, 2, 3, 1, 2, 2], [1, 2, 3, 2, 2, 1], [2, 2, 3, 2, 1, 1], [2, 2, 1, 1, 3, 2],
    [2, 2, 1, 2, 3, 1], [2, 1, 3, 2, 1, 2], [2, 2, 3, 1, 1, 2], [3, 1, 2, 1, 3, 1],
    [3, 1, 1, 2, 2, 2], [3, 2, 1, 1, 2, 2], [3, 2, 1, 2, 2, 1], [3, 1, 2, 2, 1, 2],
    [3, 2, 2, 1, 1, 2], [3, 2, 2, 2, 1, 1], [2, 1, 2, 1, 2, 3], [2, 1, 2, 3, 2, 1],
    [2, 3, 2, 1, 2, 1], [1, 1, 1, 3, 2, 3], [1, 3, 1, 1, 2, 3], [1, 3, 1, 3, 2, 1],
    [1, 1, 2, 3, 1, 3], [1, 3, 2, 1, 1, 3], [1, 3, 2, 3, 1, 1], [2, 1, 1, 3, 1, 3],
    [2, 3, 1, 1, 1, 3], [2, 3, 1, 3, 1, 1], [1, 1, 2, 1, 3, 3], [1, 1, 2, 3, 3, 1],
    [1, 3, 2, 1, 3, 1], [1, 1, 3, 1, 2, 3], [1, 1, 3, 3, 2, 1], [1, 3, 3, 1, 2, 1],
    [3, 1, 3, 1, 2, 1], [2, 1, 1, 3, 3, 1], [2, 3, 1, 1, 3, 1], [2, 1, 3, 1, 1, 3],
    [2, 1, 3, 3, 1, 1], [2, 1, 3, 1, 3, 1], [3, 1, 1, 1, 2, 3], [3, 1, 1, 3, 2, 1],
    [3, 3, 1, 1, 2, 1], [3, 1, 2, 1, 1, 3], [3, 1, 2, 3, 1, 1], [3, 3, 2, 1, 1, 1],
    [3, 1, 4, 1, 1, 1], [2, 2, 1, 4, 1, 1], [4, 3, 1, 1, 1, 1], [1, 1, 1, 2, 2, 4],
    [1, 1, 1, 4, 2, 2], [1, 2, 1, 1, 2, 4], [1, 2, 1, 4, 2, 1], [1, 4, 1, 1, 2, 2],
    [1, 4, 1, 2, 2, 1], [1, 1, 2, 2, 1, 4], [1, 1, 2, 4, 1, 2], [1, 2, 2, 1, 1, 4],
    [1, 2, 2, 4, 1, 1], [1, 4, 2, 1, 1, 2], [1, 4, 2, 2, 1, 1], [2, 4, 1, 2, 1, 1],
    [2, 2, 1, 1, 1, 4], [4, 1, 3, 1, 1, 1], [2, 4, 1, 1, 1, 2], [1, 3, 4, 1, 1, 1],
    [1, 1, 1, 2, 4, 2], [1, 2, 1, 1, 4, 2], [1, 2, 1, 2, 4, 1], [1, 1, 4, 2, 1, 2],
    [1, 2, 4, 1, 1, 2], [1, 2, 4, 2, 1, 1], [4, 1, 1, 2, 1, 2], [4, 2, 1, 1, 1, 2],
    [4, 2, 1, 2, 1, 1], [2, 1, 2, 1, 4, 1], [2, 1, 4, 1, 2, 1], [4, 1, 2, 1, 2, 1],
    [1, 1, 1, 1, 4, 3], [1, 1, 1, 3, 4, 1], [1, 3, 1, 1, 4, 1], [1, 1, 4, 1, 1, 3],
    [1, 1, 4, 3, 1, 1], [4, 1, 1, 1, 1, 3], [4, 1, 1, 3, 1, 1], [1, 1, 3, 1, 4, 1],
    [1, 1, 4, 1, 3, 1], [3, 1, 1, 1, 4, 1], [4, 1, 1, 1, 3, 1], [2, 1, 1, 4, 1, 2],
    [2, 1, 1, 2, 1, 4], [2, 1, 1, 2, 3, 2], [2, 3, 3, 1, 1, 1],
];

pub const START_A: u8 = 103;
pub const START_B: u8 = 104;
pub const START_C: u8 = 105;
pub const STOP: u8 = 106;

const FNC3: u8 = 96;
const FNC2: u8 = 97;
const SHIFT: u8 = 98;
const CODE_C: u8 = 99;
const CODE_B: u8 = 100;
const CODE_A: u8 = 101;
const FNC1: u8 = 102;

/// Width of the bar that terminates the stop pattern
const STOP_TRAILING_BAR: u8 = 2;

/// Average per-element deviation (in modules) tolerated when matching a symbol
const MAX_AVG_VARIANCE: f32 = 0.25;
/// Deviation tolerated on any single element
const MAX_INDIVIDUAL_VARIANCE: f32 = 0.7;

/// Number of evenly spaced rows examined per image
const SCAN_LINES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    A,
    B,
    C,
}

/// Decode every distinct Code 128 payload found on the scan lines.
///
/// Pixels at or below `level` are treated as bars.
pub fn decode_image(gray: &GrayImage, level: u8) -> Vec<Vec<u8>> {
    let (width, height) = gray.dimensions();
    let mut payloads: Vec<Vec<u8>> = Vec::new();
    if width == 0 || height == 0 {
        return payloads;
    }

    let lines = SCAN_LINES.min(height);
    for i in 0..lines {
        // Centre each scan line in its band
        let y = ((2 * i + 1) as u64 * height as u64 / (2 * lines) as u64) as u32;
        let row: Vec<bool> = (0..width).map(|x| gray.get_pixel(x, y)[0] <= level).collect();

        let forward = run_lengths(row.iter().copied());
        let backward = run_lengths(row.iter().rev().copied());

        for runs in [forward, backward] {
            if let Some(payload) = decode_runs(&runs) {
                if !payloads.contains(&payload) {
                    payloads.push(payload);
                }
            }
        }
    }

    payloads
}

/// Alternating run lengths starting at the first bar
pub fn run_lengths(row: impl Iterator<Item = bool>) -> Vec<u32> {
    let mut runs = Vec::new();
    let mut current: Option<bool> = None;
    let mut length = 0u32;

    for dark in row {
        match current {
            None if !dark => continue,
            None => {
                current = Some(true);
                length = 1;
            }
            Some(c) if c == dark => length += 1,
            Some(_) => {
                runs.push(length);
                current = Some(dark);
                length = 1;
            }
        }
    }
    if current.is_some() {
        runs.push(length);
    }

    runs
}

/// Find a start symbol in `runs` and decode the symbol that follows it
pub fn decode_runs(runs: &[u32]) -> Option<Vec<u8>> {
    let mut i = 0;
    while i + 6 <= runs.len() {
        if let Some(start @ (START_A | START_B | START_C)) = match_symbol(&runs[i..i + 6]) {
            if let Some(payload) = decode_from(runs, i, start) {
                return Some(payload);
            }
        }
        // Symbols always begin on a bar
        i += 2;
    }
    None
}

fn decode_from(runs: &[u32], start_index: usize, start: u8) -> Option<Vec<u8>> {
    let mut values = vec![start];
    let mut pos = start_index + 6;

    loop {
        if pos + 6 > runs.len() {
            return None;
        }
        let value = match_symbol(&runs[pos..pos + 6])?;
        let unit = runs[pos..pos + 6].iter().sum::<u32>() as f32 / 11.0;
        pos += 6;

        match value {
            STOP => {
                let bar = *runs.get(pos)? as f32 / unit;
                if (bar - STOP_TRAILING_BAR as f32).abs() > MAX_INDIVIDUAL_VARIANCE {
                    return None;
                }
                break;
            }
            START_A | START_B | START_C => return None,
            _ => values.push(value),
        }
    }

    // Start plus at least the check symbol
    if values.len() < 2 {
        return None;
    }
    let check = values.pop()?;
    if checksum(&values) != check {
        return None;
    }

    expand(start, &values[1..])
}

/// Mod-103 weighted sum over the start symbol and data symbols
pub fn checksum(values: &[u8]) -> u8 {
    let sum: u32 = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i.max(1) as u32) * v as u32)
        .sum();
    (sum % 103) as u8
}

/// Best-matching symbol value for six runs, if close enough
fn match_symbol(runs: &[u32]) -> Option<u8> {
    let total: u32 = runs.iter().sum();
    if total == 0 {
        return None;
    }
    let unit = total as f32 / 11.0;

    let mut best: Option<(u8, f32)> = None;
    for (value, pattern) in PATTERNS.iter().enumerate() {
        let mut sum = 0.0f32;
        let mut within = true;
        for (&run, &expected) in runs.iter().zip(pattern.iter()) {
            let deviation = (run as f32 / unit - expected as f32).abs();
            if deviation > MAX_INDIVIDUAL_VARIANCE {
                within = false;
                break;
            }
            sum += deviation;
        }
        if !within {
            continue;
        }
        let average = sum / 6.0;
        if best.is_none_or(|(_, b)| average < b) {
            best = Some((value as u8, average));
        }
    }

    best.filter(|(_, average)| *average <= MAX_AVG_VARIANCE)
        .map(|(value, _)| value)
}

/// Expand data symbol values into payload bytes
fn expand(start: u8, data: &[u8]) -> Option<Vec<u8>> {
    let mut set = match start {
        START_A => CodeSet::A,
        START_B => CodeSet::B,
        START_C => CodeSet::C,
        _ => return None,
    };
    let mut shifted = false;
    let mut extended = false;
    let mut out = Vec::with_capacity(data.len() * 2);

    for &value in data {
        let active = match (shifted, set) {
            (true, CodeSet::A) => CodeSet::B,
            (true, CodeSet::B) => CodeSet::A,
            _ => set,
        };
        shifted = false;

        match active {
            CodeSet::C => match value {
                0..=99 => {
                    out.push(b'0' + value / 10);
                    out.push(b'0' + value % 10);
                }
                CODE_B => set = CodeSet::B,
                CODE_A => set = CodeSet::A,
                FNC1 => {}
                _ => return None,
            },
            CodeSet::A | CodeSet::B => match value {
                0..=95 => {
                    let mut byte = match active {
                        CodeSet::A if value >= 64 => value - 64,
                        _ => value + 32,
                    };
                    if extended {
                        byte += 128;
                        extended = false;
                    }
                    out.push(byte);
                }
                FNC3 | FNC2 | FNC1 => {}
                SHIFT => shifted = true,
                CODE_C => set = CodeSet::C,
                CODE_B if active == CodeSet::A => set = CodeSet::B,
                CODE_B => extended = true,
                CODE_A if active == CodeSet::B => set = CodeSet::A,
                CODE_A => extended = true,
                _ => return None,
            },
        }
    }

    Some(out)
}

/// Symbol values (start, data, check, stop) encoding printable ASCII in code set B
pub fn encode_b(text: &str) -> Option<Vec<u8>> {
    let mut values = vec![START_B];
    for byte in text.bytes() {
        if !(32..=127).contains(&byte) {
            return None;
        }
        values.push(byte - 32);
    }
    values.push(checksum(&values));
    values.push(STOP);
    Some(values)
}

/// Module widths of the bars and spaces for a symbol value sequence,
/// starting with a bar; the stop symbol includes its trailing bar
pub fn module_widths(values: &[u8]) -> Vec<u8> {
    let mut widths = Vec::with_capacity(values.len() * 6 + 1);
    for &value in values {
        if let Some(pattern) = PATTERNS.get(value as usize) {
            widths.extend_from_slice(pattern);
        }
        if value == STOP {
            widths.push(STOP_TRAILING_BAR);
        }
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn runs_for(values: &[u8], module: u32) -> Vec<u32> {
        module_widths(values).iter().map(|&w| w as u32 * module).collect()
    }

    fn render(values: &[u8], module: u32, height: u32) -> GrayImage {
        let widths = module_widths(values);
        let quiet = 10 * module;
        let width = quiet * 2 + widths.iter().map(|&w| w as u32 * module).sum::<u32>();
        let mut img = GrayImage::from_pixel(width, height, Luma([255u8]));

        let mut x = quiet;
        for (i, &w) in widths.iter().enumerate() {
            let span = w as u32 * module;
            if i % 2 == 0 {
                for dx in 0..span {
                    for y in 0..height {
                        img.put_pixel(x + dx, y, Luma([0u8]));
                    }
                }
            }
            x += span;
        }
        img
    }

    #[test]
    fn every_pattern_spans_eleven_modules() {
        for (value, pattern) in PATTERNS.iter().enumerate() {
            let total: u8 = pattern.iter().sum();
            assert_eq!(total, 11, "symbol {value}");
        }
    }

    #[test]
    fn patterns_are_unique() {
        for (i, a) in PATTERNS.iter().enumerate() {
            for b in PATTERNS.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn checksum_matches_reference() {
        // Start B, "P", "J": 104 + 1*48 + 2*42 = 236, 236 % 103 = 30
        assert_eq!(checksum(&[START_B, 48, 42]), 30);
    }

    #[test]
    fn decodes_set_b_runs() {
        let values = encode_b("JP999999999").unwrap();
        let payload = decode_runs(&runs_for(&values, 3)).unwrap();
        assert_eq!(payload, b"JP999999999");
    }

    #[test]
    fn decodes_rendered_image_in_both_directions() {
        let values = encode_b("Resi-42").unwrap();
        let img = render(&values, 2, 20);
        assert_eq!(decode_image(&img, 127), vec![b"Resi-42".to_vec()]);

        let flipped = image::imageops::flip_horizontal(&img);
        assert_eq!(decode_image(&flipped, 127), vec![b"Resi-42".to_vec()]);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut values = encode_b("JP123456789").unwrap();
        let check = values.len() - 2;
        values[check] = (values[check] + 1) % 103;
        assert!(decode_runs(&runs_for(&values, 2)).is_none());
    }

    #[test]
    fn code_set_c_pairs_and_switch_to_b() {
        // Start C, 12, 34, Code B, "X"
        let mut values = vec![START_C, 12, 34, CODE_B, b'X' - 32];
        values.push(checksum(&values));
        values.push(STOP);
        assert_eq!(decode_runs(&runs_for(&values, 2)).unwrap(), b"1234X");
    }

    #[test]
    fn set_a_control_characters_and_shift() {
        // Start A, "A", TAB (73 = 9 + 64), Shift, "a" (set B value 65)
        let mut values = vec![START_A, 33, 73, SHIFT, 65, 33];
        values.push(checksum(&values));
        values.push(STOP);
        assert_eq!(decode_runs(&runs_for(&values, 2)).unwrap(), b"A\ta\x41".to_vec());
    }

    #[test]
    fn fnc4_produces_extended_bytes() {
        // Start B, FNC4, "A" -> 0xC1
        let mut values = vec![START_B, CODE_B, 33];
        values.push(checksum(&values));
        values.push(STOP);
        let payload = decode_runs(&runs_for(&values, 2)).unwrap();
        assert_eq!(payload, vec![0xC1]);
        assert!(String::from_utf8(payload).is_err());
    }

    #[test]
    fn blank_image_yields_nothing() {
        let img = GrayImage::from_pixel(50, 10, Luma([255u8]));
        assert!(decode_image(&img, 127).is_empty());
    }

    #[test]
    fn run_lengths_skip_leading_space() {
        let row = [false, false, true, true, false, true, true, true, false];
        assert_eq!(run_lengths(row.into_iter()), vec![2, 1, 3, 1]);
    }
}
