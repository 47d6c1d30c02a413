//! Turns raw generated text into TXT character-strings.

/// Largest payload of a single TXT character-string.
pub const MAX_CHUNK_LEN: usize = 255;

/// Marker the chat template may leave in the completion.
const ASSISTANT_MARKER: &str = "<|assistant|>";

/// Strip the endpoint's two-line preamble and any assistant markers.
pub fn clean(raw: &str) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let body = if lines.len() > 2 {
        lines[2..].join("\n")
    } else {
        raw.to_string()
    };

    body.replace(ASSISTANT_MARKER, "")
}

/// Split `text` into consecutive chunks of at most [`MAX_CHUNK_LEN`] bytes.
///
/// Boundaries are byte offsets and may fall inside a multi-byte character.
/// Empty text yields a single empty chunk.
pub fn chunk(text: &[u8]) -> Vec<Vec<u8>> {
    if text.is_empty() {
        return vec![Vec::new()];
    }

    text.chunks(MAX_CHUNK_LEN).map(<[u8]>::to_vec).collect()
}

/// Clean and chunk a completion in one step.
pub fn encode(raw: &str) -> Vec<Vec<u8>> {
    chunk(clean(raw).as_bytes())
}
