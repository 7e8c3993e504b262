//! Splitting chunked process output into lines.

/// Turns a stream of text chunks into complete lines.
///
/// Chunks may arrive in arbitrary sizes; an incomplete trailing line is kept
/// until a later chunk terminates it or [`LineFramer::flush`] is called.
/// `\n`, `\r\n` and a lone `\r` all terminate a line and are never part of an
/// emitted line.
#[derive(Clone, Debug, Default)]
pub struct LineFramer {
    buf: String,
    // A `\r` ended the previous chunk; a leading `\n` in the next chunk
    // belongs to the same terminator.
    pending_cr: bool,
}

impl LineFramer {
    /// Creates an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the partial line held back so far.
    pub fn partial(&self) -> &str {
        &self.buf
    }

    /// Returns `true` if no partial line is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Feeds a chunk and returns every line it completes, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut lines = Vec::new();
        self.feed_with(chunk, |line| lines.push(line));
        lines
    }

    /// Like [`LineFramer::feed`], but hands each completed line to `emit`
    /// as soon as it is found.
    pub fn feed_with(&mut self, chunk: &str, mut emit: impl FnMut(String)) {
        let mut rest = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(stripped) = rest.strip_prefix('\n') {
                rest = stripped;
            }
        }

        while let Some(idx) = rest.find(['\r', '\n']) {
            self.buf.push_str(&rest[..idx]);
            emit(std::mem::take(&mut self.buf));

            let after = &rest[idx + 1..];
            rest = if rest.as_bytes()[idx] == b'\r' {
                if after.is_empty() {
                    self.pending_cr = true;
                    after
                } else {
                    after.strip_prefix('\n').unwrap_or(after)
                }
            } else {
                after
            };
        }
        self.buf.push_str(rest);
    }

    /// Returns the buffered partial line, if any, and clears the buffer.
    pub fn flush(&mut self) -> Option<String> {
        self.pending_cr = false;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

/// Incremental lossy UTF-8 decoder that carries an incomplete multi-byte
/// sequence over to the next read.
#[derive(Debug, Default)]
pub(crate) struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut input = self.pending.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = input.split_at(err.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8.
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            input = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = input.to_vec();
        out
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}
