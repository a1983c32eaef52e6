const ELLIPSIS: &str = "...";

/// Cuts `content` to `max_chars` characters, appending an ellipsis when
/// anything was dropped. Counts chars, not bytes.
pub fn truncate_preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &content[..cut], ELLIPSIS),
        None => content.to_string(),
    }
}

/// Preview text for summaries and push bodies. Attachment-only messages get
/// a placeholder instead of an empty string.
pub fn preview_for(content: &str, photo_count: usize, file_count: usize, max_chars: usize) -> String {
    if !content.trim().is_empty() {
        return truncate_preview(content, max_chars);
    }
    match (photo_count, file_count) {
        (0, 0) => String::new(),
        (_, 0) => "Sent a photo".to_string(),
        _ => "Sent a file".to_string(),
    }
}
