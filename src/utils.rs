use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::Path;

/// Timestamped file stem with microsecond resolution
pub fn capture_stem(now: &DateTime<Local>) -> String {
    format!("captcha_{}", now.format("%Y%m%d_%H%M%S_%6f"))
}

/// PNG file name for the given collision attempt (0 is the plain name)
pub fn capture_filename(stem: &str, attempt: usize) -> String {
    if attempt == 0 {
        format!("{}.png", stem)
    } else {
        format!("{}_{}.png", stem, attempt)
    }
}

/// Read a list of URLs, one per line; blank lines and `#` comments are ignored
pub fn read_url_list(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_string())
        .collect())
}
