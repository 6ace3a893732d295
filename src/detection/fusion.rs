use crate::models::{CandidateSet, FusionOutcome};

pub const RECEIVED_HEADER: &str = "📷 Gambar diterima.";
pub const FOUND_HEADER: &str = "✅ Ditemukan nomor resi:";
pub const NOT_FOUND_MESSAGE: &str = "⚠️ Tidak ditemukan nomor resi dari teks/barcode.";
pub const ITEM_MARKER: &str = "📦";

/// Union of both channels plus the chat/camera summary
pub fn fuse(text_candidates: &CandidateSet, barcode_candidates: &CandidateSet) -> FusionOutcome {
    let identifiers: CandidateSet = text_candidates
        .union(barcode_candidates)
        .cloned()
        .collect();
    let summary = render_summary(&identifiers);

    FusionOutcome { identifiers, summary }
}

pub fn render_summary(identifiers: &CandidateSet) -> String {
    let mut message = format!("{}\n", RECEIVED_HEADER);

    if identifiers.is_empty() {
        message.push_str(NOT_FOUND_MESSAGE);
        return message;
    }

    message.push_str(FOUND_HEADER);
    for id in identifiers {
        message.push('\n');
        message.push_str(ITEM_MARKER);
        message.push(' ');
        message.push_str(id.as_str());
    }
    message
}
