/// Buffered line splitter over decoded text.
///
/// Holds at most one partial (newline-less) line between calls to `feed`.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and returns every line it completes, without the `\n`.
    pub fn feed(&mut self, text: &str) -> Vec<String> {
        self.buf.push_str(text);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].find('\n') {
            let end = start + offset;
            lines.push(self.buf[start..end].to_string());
            start = end + 1;
        }
        self.buf.drain(..start);
        lines
    }

    /// Takes the trailing partial line, if any, leaving the buffer empty.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn pending(&self) -> &str {
        &self.buf
    }
}
