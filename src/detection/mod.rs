pub mod preprocessing;
pub mod ocr;
pub mod text;
pub mod code128;
pub mod barcode;
pub mod fusion;

pub use barcode::{CodeScanner, extract_barcode_candidates};
pub use fusion::fuse;
pub use ocr::{OcrsRecognizer, TextRecognizer};
pub use preprocessing::{Binarizer, normalize};
pub use text::extract_text_candidates;
