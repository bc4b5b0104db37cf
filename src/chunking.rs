/// A piece of a document that gets its own embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The actual text content of this chunk
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// Id of the document this chunk belongs to
    pub document_id: String,
    /// Position of the chunk within its document, starting at 0
    pub chunk_index: usize,
    /// Byte offset of the chunk's first paragraph in the document
    pub start_position: usize,
}

const TARGET_TOKENS: usize = 500;

/// Split text into chunks of approximately 500 tokens.
///
/// Paragraphs are packed together until the target is reached. A paragraph
/// that is too large on its own is split on sentence boundaries.
pub fn split_into_chunks(text: &str, document_id: &str) -> Vec<TextChunk> {
    let mut pieces: Vec<(usize, &str)> = Vec::new();
    for (offset, paragraph) in paragraphs(text) {
        if estimate_token_count(paragraph) > TARGET_TOKENS {
            pieces.extend(sentences(paragraph).map(|(o, s)| (offset + o, s)));
        } else {
            pieces.push((offset, paragraph));
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;
    let mut current_start = 0;

    for (offset, piece) in pieces {
        let piece_tokens = estimate_token_count(piece);

        if !current.is_empty() && current_tokens + piece_tokens > TARGET_TOKENS {
            push_chunk(&mut chunks, &mut current, current_tokens, current_start, document_id);
            current_tokens = 0;
        }

        if current.is_empty() {
            current_start = offset;
        } else {
            current.push_str("\n\n");
        }
        current.push_str(piece);
        current_tokens += piece_tokens;
    }

    if !current.is_empty() {
        push_chunk(&mut chunks, &mut current, current_tokens, current_start, document_id);
    }

    chunks
}

fn push_chunk(
    chunks: &mut Vec<TextChunk>,
    text: &mut String,
    token_count: usize,
    start_position: usize,
    document_id: &str,
) {
    chunks.push(TextChunk {
        text: std::mem::take(text),
        token_count,
        document_id: document_id.to_string(),
        chunk_index: chunks.len(),
        start_position,
    });
}

/// Non-empty paragraphs with their byte offsets, trimmed
fn paragraphs(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.split("\n\n")
        .scan(0, |offset, raw| {
            let start = *offset;
            *offset += raw.len() + 2;
            Some((start, raw))
        })
        .filter_map(|(start, raw)| trimmed_with_offset(start, raw))
}

/// Sentences ending in `.`, `!`, `?` or a newline, terminator included
fn sentences(paragraph: &str) -> impl Iterator<Item = (usize, &str)> {
    paragraph
        .split_inclusive(|c: char| matches!(c, '.' | '!' | '?' | '\n'))
        .scan(0, |offset, raw| {
            let start = *offset;
            *offset += raw.len();
            Some((start, raw))
        })
        .filter_map(|(start, raw)| trimmed_with_offset(start, raw))
}

fn trimmed_with_offset(start: usize, raw: &str) -> Option<(usize, &str)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let leading = raw.len() - raw.trim_start().len();
    Some((start + leading, trimmed))
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_token_count() {
        assert_eq!(estimate_token_count("Hello, world!"), 4);
        assert_eq!(estimate_token_count("   "), 0);
    }

    #[test]
    fn test_small_document_is_one_chunk() {
        let text = "First paragraph.\n\n\n\nSecond paragraph.";
        let chunks = split_into_chunks(text, "doc-1");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First paragraph.\n\nSecond paragraph.");
        assert_eq!(chunks[0].document_id, "doc-1");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_position, 0);
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(split_into_chunks(" \n\n \n", "doc").is_empty());
    }

    #[test]
    fn test_paragraphs_are_packed_up_to_target() {
        // 300 tokens per paragraph: two never fit together.
        let paragraph = vec!["word"; 300].join(" ");
        let text = format!("{p}\n\n{p}\n\n{p}", p = paragraph);
        let chunks = split_into_chunks(&text, "doc");

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.token_count, 300);
            assert_eq!(&text[chunk.start_position..chunk.start_position + 4], "word");
        }
        assert_eq!(chunks[1].start_position, paragraph.len() + 2);
    }

    #[test]
    fn test_oversized_paragraph_is_split_on_sentences() {
        // Each sentence is 100 words plus a period.
        let sentence = format!("{}.", vec!["token"; 100].join(" "));
        let paragraph = vec![sentence.as_str(); 8].join(" ");
        let chunks = split_into_chunks(&paragraph, "doc");

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.token_count <= TARGET_TOKENS));
        assert!(chunks.iter().all(|c| c.text.ends_with('.')));
        assert_eq!(chunks[0].start_position, 0);
        assert!(paragraph[chunks[1].start_position..].starts_with("token"));
    }
}
