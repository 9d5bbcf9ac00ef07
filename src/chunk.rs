//! Overlapping fixed-size text chunker.
//!
//! Splits each page of an extracted PDF into chunks of roughly
//! `chunk_chars` characters, with consecutive chunks sharing
//! `overlap_chars` characters so meaning is not lost at boundaries. Every
//! chunk carries its originating page number and line range, and is
//! stamped with the owning document id — that tag is the only thing that
//! later scopes retrieval to one document.
//!
//! Chunk ids are deterministic (SHA-256 of document id, page, and index,
//! folded into a UUID), so re-ingesting a document writes the same ids
//! instead of accumulating duplicates.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Split all pages of a document, numbering pages from 1 and chunk
/// indices contiguously across the whole document. Whitespace-only pages
/// produce no chunks; every other page produces at least one.
pub fn chunk_pages(document_id: &str, pages: &[String], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index: i64 = 0;

    for (page_no, text) in pages.iter().enumerate() {
        let page = page_no as u32 + 1;
        chunk_page(
            document_id,
            page,
            text,
            config.chunk_chars,
            config.overlap_chars,
            &mut index,
            &mut chunks,
        );
    }

    chunks
}

fn chunk_page(
    document_id: &str,
    page: u32,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
    index: &mut i64,
    out: &mut Vec<Chunk>,
) {
    if text.trim().is_empty() {
        return;
    }

    // Byte offset of every char boundary, plus a trailing sentinel, so
    // character windows can be mapped back to valid byte ranges.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let n_chars = boundaries.len() - 1;

    let step = chunk_chars.saturating_sub(overlap_chars).max(1);
    let mut start_char = 0usize;

    loop {
        let end_char = (start_char + chunk_chars).min(n_chars);
        let byte_start = boundaries[start_char];
        let byte_end = boundaries[end_char];

        let raw = &text[byte_start..byte_end];
        let piece = raw.trim();
        if !piece.is_empty() {
            let leading = raw.len() - raw.trim_start().len();
            let trailing = raw.len() - raw.trim_end().len();
            let line_start = count_lines(&text[..byte_start + leading]);
            let line_end = count_lines(&text[..byte_end - trailing]);

            out.push(Chunk {
                id: chunk_id(document_id, page, *index),
                document_id: document_id.to_string(),
                page,
                line_start,
                line_end,
                chunk_index: *index,
                text: piece.to_string(),
            });
            *index += 1;
        }

        if end_char == n_chars {
            break;
        }
        start_char += step;
    }
}

/// 1-based line number of the position right after `prefix`.
fn count_lines(prefix: &str) -> u32 {
    prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1
}

/// Deterministic chunk id: SHA-256 of (document id, page, index) folded
/// into a UUID, which doubles as the vector record id.
fn chunk_id(document_id: &str, page: u32, index: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
