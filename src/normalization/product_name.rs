use std::collections::BTreeSet;

/// Words must be longer than this many characters to count toward overlap.
pub const MIN_SIGNIFICANT_WORD_LEN: usize = 3;

/// Canonicalized product name used when scoring folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductKey {
    normalized: String,
    words: BTreeSet<String>,
}

impl ProductKey {
    /// Build a comparison key from a catalog product name.
    ///
    /// Normalization steps:
    /// - lowercase
    /// - hyphens and underscores become spaces
    /// - trim surrounding whitespace
    /// - record the set of significant words (longer than three characters)
    pub fn new(raw: &str) -> Self {
        let normalized = collapse_separators(&raw.to_lowercase()).trim().to_string();
        let words = significant_words(normalized.split_whitespace());
        Self { normalized, words }
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn words(&self) -> &BTreeSet<String> {
        &self.words
    }

    /// Substring test against the normalized name (category keywords).
    pub fn mentions(&self, keyword: &str) -> bool {
        !keyword.is_empty() && self.normalized.contains(keyword)
    }
}

/// `-` and `_` are interchangeable with spaces in names and folder names.
pub fn collapse_separators(raw: &str) -> String {
    raw.replace(['-', '_'], " ")
}

/// Lowercase, then squeeze runs of whitespace/`-`/`_` to a single space.
/// Used for the exact-name diagnostics where spacing differences should not matter.
pub fn loose_key(raw: &str) -> String {
    collapse_separators(&raw.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words of a slash-separated folder path; separators and whitespace both split.
pub fn path_words(path: &str) -> BTreeSet<String> {
    significant_words(path.split(|c: char| c == '/' || c.is_whitespace()))
}

fn significant_words<'a, I>(words: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    words
        .into_iter()
        .filter(|w| w.chars().count() > MIN_SIGNIFICANT_WORD_LEN)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_separators() {
        let key = ProductKey::new("  Mens-Underwear_Classic ");
        assert_eq!(key.normalized(), "mens underwear classic");
        assert!(key.mentions("mens"));
        assert!(!key.mentions(""));
    }

    #[test]
    fn keeps_only_significant_words() {
        let key = ProductKey::new("Boys Vest Top Cantex Cantex");
        let words: Vec<&str> = key.words().iter().map(String::as_str).collect();
        assert_eq!(words, vec!["boys", "cantex", "vest"]);
    }

    #[test]
    fn path_words_split_on_slashes() {
        let words = path_words("women/panties - women/shorty");
        assert!(words.contains("women"));
        assert!(words.contains("panties"));
        assert!(words.contains("shorty"));
        assert!(!words.contains("-"));
    }

    #[test]
    fn loose_key_squeezes_runs() {
        assert_eq!(loose_key("Fit  Shorts -_ Black"), "fit shorts black");
    }
}
