/// A set of prompt terminators searched for in the read buffer.
///
/// A prompt matches when it occurs anywhere in the accumulated output, not
/// only at the end of the last line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    patterns: Vec<Vec<u8>>,
    ignore_case: bool,
}

impl PromptSet {
    /// Case-sensitive prompts, used for command completion.
    pub fn exact<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(patterns, false)
    }

    /// ASCII case-insensitive prompts, used for login and password prompts.
    pub fn ignore_case<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(patterns, true)
    }

    fn build<I, S>(patterns: I, ignore_case: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().as_bytes().to_vec())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            patterns,
            ignore_case,
        }
    }

    /// Returns true if any prompt occurs in `haystack`.
    pub fn is_found_in(&self, haystack: &[u8]) -> bool {
        self.patterns.iter().any(|needle| {
            needle.len() <= haystack.len()
                && haystack.windows(needle.len()).any(|window| {
                    if self.ignore_case {
                        window.eq_ignore_ascii_case(needle)
                    } else {
                        window == needle.as_slice()
                    }
                })
        })
    }
}

/// Output accumulated from the device since the last completed read.
///
/// Bytes are kept undecoded so a multi-byte character split across two
/// chunks is decoded correctly once the read completes.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    data: Vec<u8>,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and reports whether any prompt now occurs in the
    /// whole buffer.
    pub fn push(&mut self, chunk: &[u8], prompts: &PromptSet) -> bool {
        self.data.extend_from_slice(chunk);
        prompts.is_found_in(&self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drains the buffer as text.
    pub fn take(&mut self) -> String {
        let data = std::mem::take(&mut self.data);
        match String::from_utf8(data) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}
