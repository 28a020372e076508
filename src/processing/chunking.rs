//! Paragraph-aggregation chunking.
//!
//! Documents are split on blank lines (two or more consecutive newlines, `\r\n` included) and
//! paragraphs are greedily packed into chunks of at most `size_threshold` characters. A
//! paragraph is never split: one that is longer than the threshold on its own becomes a single
//! oversize chunk. Sizes are counted in Unicode scalar values and include the blank-line
//! separator between packed paragraphs.

use sha2::{Digest, Sha256};
use std::path::Path;

use super::types::{Chunk, ChunkingError};

/// Separator inserted between paragraphs packed into the same chunk.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

const SEPARATOR_LEN: usize = PARAGRAPH_SEPARATOR.len();

/// Read a UTF-8 document from disk.
pub async fn read_document(path: &Path) -> Result<String, ChunkingError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ChunkingError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Split `text` into ordered chunks no larger than `size_threshold` characters.
///
/// Returns an empty vector for documents without any non-blank paragraph.
pub fn chunk_document(text: &str, size_threshold: usize) -> Result<Vec<Chunk>, ChunkingError> {
    if size_threshold == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for paragraph in split_paragraphs(text) {
        let paragraph_len = paragraph.chars().count();
        if !buffer.is_empty() && buffer_len + SEPARATOR_LEN + paragraph_len > size_threshold {
            close_chunk(&mut chunks, &mut buffer);
            buffer_len = 0;
        }
        if !buffer.is_empty() {
            buffer.push_str(PARAGRAPH_SEPARATOR);
            buffer_len += SEPARATOR_LEN;
        }
        buffer.push_str(paragraph);
        buffer_len += paragraph_len;
    }

    if !buffer.is_empty() {
        close_chunk(&mut chunks, &mut buffer);
    }

    tracing::debug!(
        chunks = chunks.len(),
        size_threshold,
        "Chunked document"
    );
    Ok(chunks)
}

/// Compute the SHA-256 hex digest identifying a chunk's content.
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn close_chunk(chunks: &mut Vec<Chunk>, buffer: &mut String) {
    let content = std::mem::take(buffer);
    chunks.push(Chunk::new(chunks.len() + 1, content));
}

/// Split on runs of two or more newlines, dropping blank paragraphs.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut raw = Vec::new();
    let mut start = 0;
    let mut run_start = None;
    let mut newlines = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let newline_width = match bytes[idx] {
            b'\n' => 1,
            b'\r' if bytes.get(idx + 1) == Some(&b'\n') => 2,
            _ => 0,
        };

        if newline_width > 0 {
            run_start.get_or_insert(idx);
            newlines += 1;
            idx += newline_width;
            continue;
        }

        if let Some(run) = run_start.take()
            && newlines >= 2
        {
            raw.push(&text[start..run]);
            start = idx;
        }
        newlines = 0;
        idx += 1;
    }
    raw.push(&text[start..]);

    raw.into_iter()
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(fill: char, len: usize) -> String {
        std::iter::repeat_n(fill, len).collect()
    }

    #[test]
    fn short_paragraphs_share_one_chunk() {
        let chunks = chunk_document("Alpha.\n\nBeta.", 1000).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sequence_number, 1);
        assert_eq!(chunks[0].content, "Alpha.\n\nBeta.");
    }

    #[test]
    fn large_paragraphs_get_their_own_chunks() {
        let first = paragraph('a', 600);
        let second = paragraph('b', 600);
        let text = format!("{first}\n\n{second}\n");
        let chunks = chunk_document(&text, 1000).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, first);
        assert_eq!(chunks[1].content, second);
        assert_eq!(chunks[1].sequence_number, 2);
    }

    #[test]
    fn separator_counts_toward_threshold() {
        // "Alpha." + "\n\n" + "Beta." is 13 characters.
        assert_eq!(chunk_document("Alpha.\n\nBeta.", 13).unwrap().len(), 1);
        assert_eq!(chunk_document("Alpha.\n\nBeta.", 12).unwrap().len(), 2);
    }

    #[test]
    fn oversize_paragraph_is_kept_whole() {
        let huge = paragraph('x', 2500);
        let text = format!("intro\n\n{huge}\n\noutro");
        let chunks = chunk_document(&text, 1000).unwrap();

        let contents: Vec<_> = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["intro", huge.as_str(), "outro"]);
    }

    #[test]
    fn empty_and_blank_documents_yield_no_chunks() {
        assert!(chunk_document("", 1000).unwrap().is_empty());
        assert!(chunk_document("  \n\n\t\n\n\n", 1000).unwrap().is_empty());
    }

    #[test]
    fn rejects_zero_threshold() {
        assert!(matches!(
            chunk_document("Alpha.", 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }

    #[test]
    fn single_newlines_stay_inside_a_paragraph() {
        let chunks = chunk_document("line one\nline two\n\nnext", 10).unwrap();
        assert_eq!(chunks[0].content, "line one\nline two");
        assert_eq!(chunks[1].content, "next");
    }

    #[test]
    fn longer_newline_runs_and_crlf_separate_paragraphs() {
        assert_eq!(
            split_paragraphs("one\n\n\n\ntwo\r\n\r\nthree\r\nstill three"),
            vec!["one", "two", "three\r\nstill three"]
        );
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = (1..=40)
            .map(|n| format!("Paragraph {n} talks about the yellow brick road."))
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(
            chunk_document(&text, 300).unwrap(),
            chunk_document(&text, 300).unwrap()
        );
    }

    #[test]
    fn chunks_respect_threshold_unless_single_paragraph() {
        let lengths = [120, 480, 30, 999, 1400, 5, 700, 300, 301, 64];
        let paragraphs: Vec<String> = lengths
            .iter()
            .enumerate()
            .map(|(idx, len)| paragraph(char::from(b'a' + idx as u8), *len))
            .collect();
        let text = paragraphs.join("\n\n");

        for chunk in chunk_document(&text, 1000).unwrap() {
            let len = chunk.content.chars().count();
            let single = !chunk.content.contains(PARAGRAPH_SEPARATOR);
            assert!(len <= 1000 || single, "chunk {} too large", chunk.sequence_number);
        }
    }

    #[test]
    fn chunks_reconstruct_original_paragraphs() {
        let text = "  First paragraph.  \n\nSecond\nwith two lines.\n\n\n\nThird é ü ß.\n\n \n\nFourth.";
        let chunks = chunk_document(text, 25).unwrap();
        let rebuilt: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.content.split(PARAGRAPH_SEPARATOR))
            .collect();
        assert_eq!(rebuilt, split_paragraphs(text));
        assert_eq!(
            rebuilt,
            vec![
                "First paragraph.",
                "Second\nwith two lines.",
                "Third é ü ß.",
                "Fourth."
            ]
        );
    }

    #[test]
    fn threshold_counts_characters_not_bytes() {
        // Each paragraph is 4 characters but 8 bytes.
        let chunks = chunk_document("éééé\n\nüüüü", 10).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        assert_eq!(
            compute_content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(compute_content_hash("abc"), compute_content_hash("abc "));
    }

    #[tokio::test]
    async fn read_document_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.txt");
        let error = read_document(&missing).await.unwrap_err();
        assert!(matches!(error, ChunkingError::Read { ref path, .. } if path == &missing));
    }
}
