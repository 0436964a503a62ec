use std::path::Path;

use crate::constants::SUPPORTED_EXTENSIONS;

/// Matches `^[A-Za-z0-9_-]+$` without pulling in a regex dependency the rest
/// of the workspace doesn't otherwise need.
pub fn is_valid_video_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Derives the default `video_name` from `original_key`: the basename with
/// its extension stripped.
pub fn default_video_name(original_key: &str) -> String {
    let basename = Path::new(original_key)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_key);
    basename.to_string()
}

pub fn is_supported_extension(original_key: &str) -> bool {
    Path::new(original_key)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_name_validation() {
        assert!(is_valid_video_name("a_valid-Name123"));
        assert!(!is_valid_video_name("bad name!"));
        assert!(!is_valid_video_name(""));
    }

    #[test]
    fn default_video_name_strips_extension_and_dir() {
        assert_eq!(default_video_name("uploads/a.mp4"), "a");
        assert_eq!(default_video_name("a.mp4"), "a");
    }

    #[test]
    fn extension_support() {
        assert!(is_supported_extension("a.mp4"));
        assert!(is_supported_extension("a.MOV"));
        assert!(!is_supported_extension("a.txt"));
    }

    #[test]
    fn callback_url_scheme() {
        assert!(is_http_url("https://stage.x/cb"));
        assert!(is_http_url("http://x/cb"));
        assert!(!is_http_url("ftp://x/cb"));
    }
}
