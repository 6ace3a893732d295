use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A token believed to be a shipment tracking ("resi") number.
///
/// Identity is the string value: two equal strings are the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResiNumber(String);

impl ResiNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResiNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResiNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResiNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Candidates produced by one extraction channel
pub type CandidateSet = BTreeSet<ResiNumber>;

/// Single-channel raster where every pixel is either 0 or 255
#[derive(Debug, Clone)]
pub struct BinarizedRaster(GrayImage);

impl BinarizedRaster {
    /// Binarize `gray`: pixels strictly above `level` become 255, the rest 0
    pub fn from_gray(gray: &GrayImage, level: u8) -> Self {
        Self(imageproc::contrast::threshold(
            gray,
            level,
            imageproc::contrast::ThresholdType::Binary,
        ))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Output of the normalizer: the decoded photo plus derived rasters
#[derive(Debug, Clone)]
pub struct NormalizedPhoto {
    pub raster: RgbImage,
    pub gray: GrayImage,
    pub binarized: BinarizedRaster,
    /// Threshold level actually applied during binarization
    pub level: u8,
}

/// Candidate sets from both channels, before fusion.
/// A failed channel contributes an empty set.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub text: CandidateSet,
    pub barcode: CandidateSet,
}

/// Deduplicated identifiers plus the rendered summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FusionOutcome {
    pub identifiers: CandidateSet,
    pub summary: String,
}

impl FusionOutcome {
    pub fn is_found(&self) -> bool {
        !self.identifiers.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Text,
    Barcode,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Text => f.write_str("text"),
            Channel::Barcode => f.write_str("barcode"),
        }
    }
}

/// An extraction channel that failed and was left out of the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFault {
    pub channel: Channel,
    pub reason: String,
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub fusion: FusionOutcome,
    pub faults: Vec<ChannelFault>,
}

impl ScanReport {
    pub fn identifiers(&self) -> &CandidateSet {
        &self.fusion.identifiers
    }

    pub fn summary(&self) -> &str {
        &self.fusion.summary
    }

    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}
