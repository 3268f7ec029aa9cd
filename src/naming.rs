//! Archive entry naming.

/// Characters that are unsafe in file names on common file systems.
pub const UNSAFE_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replaces unsafe characters with `_` and trims surrounding whitespace.
pub fn sanitize_file_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    replaced.trim().to_string()
}

/// `{ordinal:02}_{sanitized}.png`, with a 1-based ordinal.
pub fn entry_name(index: usize, title: &str) -> String {
    format!("{:02}_{}.png", index + 1, sanitize_file_name(title))
}
