use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::detection::barcode::{self, CodeScanner};
use crate::detection::ocr::{self, DisabledRecognizer, OcrsRecognizer, TextRecognizer};
use crate::detection::preprocessing::{self, Binarizer};
use crate::detection::{fusion, text};
use crate::error::{Error, Result};
use crate::models::{
    CandidateSet, Channel, ChannelFault, ExtractionResult, NormalizedPhoto, ScanReport,
};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context shared by every run of a pipeline
#[derive(Clone)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
    runs: Arc<AtomicUsize>,
}

impl PipelineContext {
    fn new() -> Self {
        Self {
            verbose: false,
            debug: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Directory for the next run's debug dumps, if debug mode is on
    fn next_debug_dir(&self) -> Option<PathBuf> {
        let debug = self.debug.as_ref()?;
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        Some(debug.output_dir.join(format!("run_{:04}", run)))
    }
}

/// Image-to-identifier extraction pipeline.
///
/// Normalizes a photo, runs the text and barcode channels over it, and fuses
/// their candidates. A failing channel degrades the result instead of failing
/// it; only an undecodable photo (or both channels failing) is an error.
#[derive(Clone)]
pub struct Pipeline {
    recognizer: Arc<dyn TextRecognizer>,
    scanners: Vec<Arc<dyn CodeScanner>>,
    binarizer: Binarizer,
    context: PipelineContext,
}

/// Channel results of one run, before fusion
struct ChannelResults {
    text: Result<CandidateSet>,
    barcode: Result<CandidateSet>,
}

impl Pipeline {
    /// Pipeline with the ocrs recognizer (models from the standard cache
    /// location) and the default QR + Code 128 scanners
    pub fn new() -> Self {
        let recognizer: Arc<dyn TextRecognizer> = match ocr::default_model_dir() {
            Ok(dir) => Arc::new(OcrsRecognizer::new(dir)),
            Err(_) => Arc::new(DisabledRecognizer),
        };

        Self {
            recognizer,
            scanners: barcode::default_scanners(),
            binarizer: Binarizer::default(),
            context: PipelineContext::new(),
        }
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(Error::Config(format!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Replace the scanner set
    pub fn with_scanners(mut self, scanners: Vec<Arc<dyn CodeScanner>>) -> Self {
        self.scanners = scanners;
        self
    }

    pub fn with_binarizer(mut self, binarizer: Binarizer) -> Self {
        self.binarizer = binarizer;
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Run the pipeline on the calling thread, one channel after the other
    pub fn run(&self, photo: &[u8]) -> Result<ScanReport> {
        let debug_dir = self.context.next_debug_dir();
        let normalized = self.normalize(photo, debug_dir.as_deref())?;

        let results = ChannelResults {
            text: self.text_channel(&normalized, debug_dir.as_deref()),
            barcode: self.barcode_channel(&normalized),
        };
        self.finish(results)
    }

    /// Run the pipeline on the blocking pool.
    ///
    /// Normalization runs first; the text and barcode channels then run as two
    /// concurrent blocking tasks and are joined before fusion.
    pub async fn process<P>(&self, photo: P) -> Result<ScanReport>
    where
        P: AsRef<[u8]> + Send + 'static,
    {
        let debug_dir = self.context.next_debug_dir();

        let this = self.clone();
        let dir = debug_dir.clone();
        let normalized = tokio::task::spawn_blocking(move || {
            this.normalize(photo.as_ref(), dir.as_deref())
        })
        .await
        .map_err(|e| Error::Internal(format!("normalizer task failed: {}", e)))??;
        let normalized = Arc::new(normalized);

        let text_task = {
            let this = self.clone();
            let normalized = normalized.clone();
            let dir = debug_dir.clone();
            tokio::task::spawn_blocking(move || this.text_channel(&normalized, dir.as_deref()))
        };
        let barcode_task = {
            let this = self.clone();
            let normalized = normalized.clone();
            tokio::task::spawn_blocking(move || this.barcode_channel(&normalized))
        };

        let (text, barcode) = tokio::join!(text_task, barcode_task);
        let results = ChannelResults {
            text: text.unwrap_or_else(|e| {
                Err(Error::RecognitionUnavailable(format!("OCR task failed: {}", e)))
            }),
            barcode: barcode.unwrap_or_else(|e| {
                Err(Error::BarcodeScanFault(format!("scan task failed: {}", e)))
            }),
        };
        self.finish(results)
    }

    fn normalize(&self, photo: &[u8], debug_dir: Option<&Path>) -> Result<NormalizedPhoto> {
        if self.context.verbose {
            tracing::info!(bytes = photo.len(), "Normalizing photo");
        }
        let normalized = preprocessing::normalize(photo, &self.binarizer)?;
        let (width, height) = normalized.raster.dimensions();
        if self.context.verbose {
            tracing::info!(width, height, level = normalized.level, "Photo decoded and binarized");
        }

        if let Some(dir) = debug_dir {
            save_debug_output(dir, &normalized)?;
            if self.context.verbose {
                tracing::info!("Debug: saved rasters to {}", dir.display());
            }
        }

        Ok(normalized)
    }

    fn text_channel(&self, normalized: &NormalizedPhoto, debug_dir: Option<&Path>) -> Result<CandidateSet> {
        let (candidates, raw_text) =
            text::extract_text_candidates(self.recognizer.as_ref(), &normalized.binarized)?;

        if let Some(dir) = debug_dir {
            std::fs::write(dir.join("03_ocr.txt"), &raw_text)?;
        }
        if self.context.verbose {
            tracing::info!(found = candidates.len(), "Text channel finished");
        }
        Ok(candidates)
    }

    fn barcode_channel(&self, normalized: &NormalizedPhoto) -> Result<CandidateSet> {
        let candidates = barcode::extract_barcode_candidates(&self.scanners, &normalized.raster)?;
        if self.context.verbose {
            tracing::info!(found = candidates.len(), "Barcode channel finished");
        }
        Ok(candidates)
    }

    fn finish(&self, results: ChannelResults) -> Result<ScanReport> {
        let mut faults = Vec::new();

        let extraction = match (results.text, results.barcode) {
            (Ok(text), Ok(barcode)) => ExtractionResult { text, barcode },
            (Err(text_err), Ok(barcode)) => {
                tracing::warn!("Text channel failed, using barcodes only: {}", text_err);
                faults.push(fault(Channel::Text, &text_err));
                ExtractionResult {
                    text: CandidateSet::new(),
                    barcode,
                }
            }
            (Ok(text), Err(barcode_err)) => {
                tracing::warn!("Barcode channel failed, using text only: {}", barcode_err);
                faults.push(fault(Channel::Barcode, &barcode_err));
                ExtractionResult {
                    text,
                    barcode: CandidateSet::new(),
                }
            }
            (Err(text_err), Err(barcode_err)) => {
                tracing::error!(
                    "Both channels failed: text: {}; barcode: {}",
                    text_err,
                    barcode_err
                );
                return Err(text_err);
            }
        };

        let fusion = fusion::fuse(&extraction.text, &extraction.barcode);
        tracing::debug!(
            text = extraction.text.len(),
            barcode = extraction.barcode.len(),
            total = fusion.identifiers.len(),
            "Fused candidates"
        );

        Ok(ScanReport { fusion, faults })
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn fault(channel: Channel, error: &Error) -> ChannelFault {
    ChannelFault {
        channel,
        reason: error.to_string(),
    }
}

fn save_debug_output(dir: &Path, normalized: &NormalizedPhoto) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let save_error = |e: image::ImageError| Error::Internal(format!("Failed to save debug image: {}", e));
    normalized.raster.save(dir.join("00_input.png")).map_err(save_error)?;
    normalized.gray.save(dir.join("01_grayscale.png")).map_err(save_error)?;
    normalized
        .binarized
        .as_image()
        .save(dir.join("02_binarized.png"))
        .map_err(save_error)?;
    Ok(())
}
