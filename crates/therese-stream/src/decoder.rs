use serde::de::DeserializeOwned;
use tracing::debug;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental line decoder for the `data: `-prefixed event stream.
///
/// Bytes are buffered and split on `\n` before any UTF-8 decoding happens,
/// so a multi-byte character split across two reads is decoded only once its
/// whole line has arrived. The trailing partial line stays buffered until
/// more bytes arrive or `finish` is called.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Buffers a raw chunk and returns the payloads of every line it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            if let Some(payload) = data_payload(&line[..idx]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes the unterminated trailing line once the transport has closed.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        data_payload(&rest)
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let payload = text.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }
    Some(payload.to_string())
}

/// Parses one payload into a frame, dropping it when it is not valid JSON for `F`.
pub fn parse_frame<F: DeserializeOwned>(payload: &str) -> Option<F> {
    match serde_json::from_str(payload) {
        Ok(frame) => Some(frame),
        Err(e) => {
            debug!(error = %e, len = payload.len(), "dropping malformed stream frame");
            None
        }
    }
}
