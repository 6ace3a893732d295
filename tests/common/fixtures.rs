use axum::Router;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use qrcode::QrCode;
use resibox::detection::barcode::{CodeScanner, RawSymbol};
use resibox::detection::code128;
use resibox::detection::ocr::TextRecognizer;
use resibox::{Error, Result};
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;

/// Renders a white label with a Code 128 barcode encoding `text`.
/// `module` is the narrowest bar width in pixels.
pub fn barcode_label(text: &str, module: u32) -> RgbImage {
    let values = code128::encode_b(text).expect("printable ASCII");
    let widths = code128::module_widths(&values);

    let quiet = 12 * module;
    let bar_height = 60;
    let margin_y = 20;
    let width = 2 * quiet + widths.iter().map(|&w| w as u32 * module).sum::<u32>();
    let height = bar_height + 2 * margin_y;

    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut x = quiet;
    for (i, &w) in widths.iter().enumerate() {
        let span = w as u32 * module;
        if i % 2 == 0 {
            for dx in 0..span {
                for y in margin_y..margin_y + bar_height {
                    img.put_pixel(x + dx, y, Rgb([0, 0, 0]));
                }
            }
        }
        x += span;
    }
    img
}

/// White label carrying a QR code that encodes `text`
pub fn qr_label(text: &str) -> RgbImage {
    let code = QrCode::new(text.as_bytes()).expect("QR payload fits");
    let gray = code
        .render::<Luma<u8>>()
        .module_dimensions(6, 6)
        .quiet_zone(true)
        .build();
    DynamicImage::ImageLuma8(gray).to_rgb8()
}

/// Plain white label, nothing to read
pub fn blank_label() -> RgbImage {
    RgbImage::from_pixel(120, 80, Rgb([250, 250, 250]))
}

pub fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode test image");
    out.into_inner()
}

/// Recognizer that "reads" a fixed block of text
pub struct FixedRecognizer(pub String);

impl FixedRecognizer {
    pub fn new(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl TextRecognizer for FixedRecognizer {
    fn recognize(&self, _image: &GrayImage) -> Result<String> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Recognizer that takes `delay` before reading nothing
pub struct SlowRecognizer(pub Duration);

impl TextRecognizer for SlowRecognizer {
    fn recognize(&self, _image: &GrayImage) -> Result<String> {
        std::thread::sleep(self.0);
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// Recognizer whose engine is missing
pub struct UnavailableRecognizer;

impl TextRecognizer for UnavailableRecognizer {
    fn recognize(&self, _image: &GrayImage) -> Result<String> {
        Err(Error::RecognitionUnavailable("models not installed".to_string()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Scanner that always faults
pub struct BrokenScanner;

impl CodeScanner for BrokenScanner {
    fn scan(&self, _gray: &GrayImage) -> Result<Vec<RawSymbol>> {
        Err(Error::BarcodeScanFault("camera firmware sent garbage".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Serve `router` on an ephemeral local port
pub async fn spawn_stub(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    addr
}

/// Address nothing listens on
pub async fn unreachable_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    addr
}
