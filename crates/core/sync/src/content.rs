use regex::Regex;

lazy_static! {
    // Markup is stripped rather than escaped; downstream renderers must
    // never see raw tags
    pub static ref RE_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Scrub message content: strip markup tags and control characters
/// (newlines survive), trim surrounding whitespace, and silently cap
/// the length.
pub fn sanitize_content(content: &str, max_length: usize) -> String {
    let without_tags = RE_TAG.replace_all(content, "");
    let cleaned: String = without_tags
        .chars()
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();

    truncate_chars(cleaned.trim(), max_length)
}

/// Cap a string at `max` characters, on a character boundary
pub fn truncate_chars(content: &str, max: usize) -> String {
    content.chars().take(max).collect()
}
