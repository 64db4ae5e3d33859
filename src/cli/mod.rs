pub mod activate;
pub mod debug_matching;
pub mod folders;
pub mod images;
pub mod products;
pub mod reports;
pub mod sync_db;

pub(crate) fn rule(ch: char, width: usize) -> String {
    std::iter::repeat(ch).take(width).collect()
}

pub(crate) fn center(text: &str, width: usize) -> String {
    format!("{text:^width$}")
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Cut to `max` characters, ending in `...` when shortened.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("short", 80), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_chars("ééééé", 4), "é...");
    }

    #[test]
    fn centers_and_rules() {
        assert_eq!(center("ab", 6), "  ab  ");
        assert_eq!(rule('=', 3), "===");
        assert_eq!(yes_no(false), "No");
    }
}
