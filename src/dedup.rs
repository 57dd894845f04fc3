use std::collections::HashSet;

/// Length of the text prefix that feeds the dedup key. Long enough to keep
/// distinct posts apart, short enough to survive trailing-render jitter.
const FINGERPRINT_PREFIX: usize = 50;

/// Derived dedup key for one observed item. The source view exposes no
/// stable per-item identifier, so identity is approximated by leading text
/// plus the rendered timestamp.
pub fn fingerprint(text: &str, timestamp: Option<&str>) -> String {
    let prefix: String = text.chars().take(FINGERPRINT_PREFIX).collect();
    format!("{prefix}|{}", timestamp.unwrap_or(""))
}

/// Accumulated identity of every retained item. Two records are the same
/// observed item if their fingerprints match or their raw texts match
/// exactly; the text fallback covers items whose timestamp render was
/// momentarily missing in one of the observations.
#[derive(Debug, Default)]
pub struct SeenSet {
    fingerprints: HashSet<String>,
    texts: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new(&self, text: &str, timestamp: Option<&str>) -> bool {
        !self.fingerprints.contains(&fingerprint(text, timestamp)) && !self.texts.contains(text)
    }

    pub fn insert(&mut self, text: &str, timestamp: Option<&str>) {
        self.fingerprints.insert(fingerprint(text, timestamp));
        self.texts.insert(text.to_string());
    }
}
