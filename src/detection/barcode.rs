//! Barcode channel: linear and matrix codes scanned from the raw raster.

use image::{DynamicImage, GrayImage, RgbImage, imageops};
use imageproc::contrast::otsu_level;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::detection::code128;
use crate::error::{Error, Result};
use crate::models::{CandidateSet, ResiNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    Qr,
    Code128,
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbology::Qr => f.write_str("QR"),
            Symbology::Code128 => f.write_str("Code 128"),
        }
    }
}

/// One decoded symbol, payload still as raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    pub symbology: Symbology,
    pub payload: Vec<u8>,
}

/// Finds and decodes every symbol of one family in a grayscale image.
///
/// Returning an empty list means "nothing found"; `Err` is reserved for
/// faults of the scanner itself.
pub trait CodeScanner: Send + Sync {
    fn scan(&self, gray: &GrayImage) -> Result<Vec<RawSymbol>>;

    fn name(&self) -> &str;
}

/// QR codes via `rqrr`
pub struct QrScanner;

impl CodeScanner for QrScanner {
    fn scan(&self, gray: &GrayImage) -> Result<Vec<RawSymbol>> {
        let gray = gray.clone();
        guard_panics(self.name(), move || {
            let mut prepared = rqrr::PreparedImage::prepare(gray);
            let mut symbols = Vec::new();
            for grid in prepared.detect_grids() {
                let mut payload = Vec::new();
                match grid.decode_to(&mut payload) {
                    Ok(_) => symbols.push(RawSymbol {
                        symbology: Symbology::Qr,
                        payload,
                    }),
                    Err(e) => tracing::debug!("QR grid found but not decodable: {}", e),
                }
            }
            symbols
        })
    }

    fn name(&self) -> &str {
        "qr"
    }
}

/// Linear Code 128, the symbology printed on courier labels
pub struct Code128Scanner;

impl CodeScanner for Code128Scanner {
    fn scan(&self, gray: &GrayImage) -> Result<Vec<RawSymbol>> {
        let level = otsu_level(gray);
        guard_panics(self.name(), || {
            // Rows first, then columns via a quarter turn
            let mut payloads = code128::decode_image(gray, level);
            for payload in code128::decode_image(&imageops::rotate90(gray), level) {
                if !payloads.contains(&payload) {
                    payloads.push(payload);
                }
            }

            payloads
                .into_iter()
                .map(|payload| RawSymbol {
                    symbology: Symbology::Code128,
                    payload,
                })
                .collect()
        })
    }

    fn name(&self) -> &str {
        "code128"
    }
}

fn guard_panics<F>(scanner: &str, f: F) -> Result<Vec<RawSymbol>>
where
    F: FnOnce() -> Vec<RawSymbol>,
{
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|_| Error::BarcodeScanFault(format!("{} scanner panicked", scanner)))
}

/// Scanners used when none are configured explicitly
pub fn default_scanners() -> Vec<Arc<dyn CodeScanner>> {
    vec![Arc::new(QrScanner), Arc::new(Code128Scanner)]
}

/// Scan the raw raster with every scanner and keep the UTF-8 payloads.
///
/// A payload that is not valid UTF-8 drops only that symbol. The first
/// scanner fault aborts the channel.
pub fn extract_barcode_candidates(
    scanners: &[Arc<dyn CodeScanner>],
    raster: &RgbImage,
) -> Result<CandidateSet> {
    let gray = DynamicImage::ImageRgb8(raster.clone()).to_luma8();
    let mut candidates = CandidateSet::new();

    for scanner in scanners {
        let symbols = scanner.scan(&gray)?;
        tracing::debug!(scanner = scanner.name(), found = symbols.len(), "Scan finished");

        for symbol in symbols {
            match String::from_utf8(symbol.payload) {
                Ok(text) => {
                    candidates.insert(ResiNumber::new(text));
                }
                Err(_) => {
                    tracing::debug!("Skipping {} symbol with non UTF-8 payload", symbol.symbology);
                }
            }
        }
    }

    Ok(candidates)
}
