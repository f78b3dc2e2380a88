/// Discord rejects presence text fields longer than 128 characters.
pub const MAX_PRESENCE_LEN: usize = 128;

/// Truncate on a character boundary, ending with an ellipsis when cut.
pub fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{head}...")
}
