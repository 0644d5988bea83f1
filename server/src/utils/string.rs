//! String utility functions

/// Cut `text` to at most `max` bytes without splitting a character
///
/// Truncated text ends with `...`, counted within the budget when it fits.
pub fn truncate_bytes(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(3);
    let mut end = budget;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_unchanged() {
        assert_eq!(truncate_bytes("bad request", 64), "bad request");
        assert_eq!(truncate_bytes("", 0), "");
    }

    #[test]
    fn test_long_text_is_cut() {
        let result = truncate_bytes(&"x".repeat(100), 10);
        assert_eq!(result, "xxxxxxx...");
        assert_eq!(result.len(), 10);
    }

    #[test]
    fn test_multibyte_boundary() {
        // 'é' is two bytes; byte 5 falls inside the third one
        let result = truncate_bytes("éééééé", 8);
        assert_eq!(result, "éé...");
    }
}
