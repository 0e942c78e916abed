/// Running assistant reply for one turn.
#[derive(Debug, Default, Clone)]
pub struct ReplyAccumulator {
    content: String,
    fragments: u64,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns the full content so far.
    pub fn append_fragment(&mut self, text: &str) -> &str {
        self.content.push_str(text);
        self.fragments = self.fragments.saturating_add(1);
        &self.content
    }

    pub fn snapshot(&self) -> &str {
        &self.content
    }

    /// Number of fragments folded in so far.
    pub fn fragments(&self) -> u64 {
        self.fragments
    }

    pub fn into_content(self) -> String {
        self.content
    }
}
