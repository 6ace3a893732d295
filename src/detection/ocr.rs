use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

pub const DETECTION_MODEL_FILE: &str = "text-detection.rten";
pub const RECOGNITION_MODEL_FILE: &str = "text-recognition.rten";

/// Turns a binarized label image into a block of text, one line per text line
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String>;

    /// Human-readable name for this engine (used in logs)
    fn name(&self) -> &str;
}

/// Standard model cache location, `$HOME/.cache/ocrs`
pub fn default_model_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| Error::RecognitionUnavailable("cannot locate home directory".to_string()))?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Load the ocrs detection and recognition models from `model_dir`
pub fn init_ocr_engine(model_dir: &Path) -> Result<OcrEngine> {
    let detection_model_path = model_dir.join(DETECTION_MODEL_FILE);
    let recognition_model_path = model_dir.join(RECOGNITION_MODEL_FILE);

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        return Err(Error::RecognitionUnavailable(format!(
            "OCR models not found. Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        )));
    }

    let unavailable = |e: &dyn std::fmt::Display| Error::RecognitionUnavailable(e.to_string());

    let detection_model = Model::load_file(&detection_model_path).map_err(|e| unavailable(&e))?;
    let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| unavailable(&e))?;

    OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })
    .map_err(|e| unavailable(&e))
}

/// `ocrs`-backed recognizer.
///
/// The engine is loaded on first use and shared read-only afterwards; a failed
/// load is retried on the next call so models installed later are picked up.
pub struct OcrsRecognizer {
    model_dir: PathBuf,
    engine: Mutex<Option<Arc<OcrEngine>>>,
}

impl OcrsRecognizer {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            engine: Mutex::new(None),
        }
    }

    fn engine(&self) -> Result<Arc<OcrEngine>> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|_| Error::RecognitionUnavailable("OCR engine lock poisoned".to_string()))?;

        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }

        tracing::info!(model_dir = %self.model_dir.display(), "Initializing OCR engine");
        let engine = Arc::new(init_ocr_engine(&self.model_dir)?);
        *guard = Some(engine.clone());
        tracing::info!("OCR engine initialized");
        Ok(engine)
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String> {
        let engine = self.engine()?;

        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| Error::RecognitionUnavailable(e.to_string()))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| Error::RecognitionUnavailable(e.to_string()))?;

        engine
            .get_text(&input)
            .map_err(|e| Error::RecognitionUnavailable(e.to_string()))
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}

/// Recognizer used when OCR is switched off; always reports unavailable
pub struct DisabledRecognizer;

impl TextRecognizer for DisabledRecognizer {
    fn recognize(&self, _image: &GrayImage) -> Result<String> {
        Err(Error::RecognitionUnavailable("OCR disabled".to_string()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}
