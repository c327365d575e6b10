//! Filename sanitization for downloaded audio files.
//!
//! Titles come straight from third-party markup, so they can hold anything: path
//! separators, control characters, quotes, kilobytes of text. The output here has to
//! survive as an on-disk name on the most restrictive common filesystem (NTFS/FAT)
//! and inside a `Content-Disposition` header.

/// Longest sanitized name, in bytes, before the extension is appended.
///
/// Leaves room for `.` plus an extension inside the usual 255-byte NAME_MAX.
pub const MAX_FILENAME_BYTES: usize = 200;

/// Used when nothing survives sanitization.
pub const DEFAULT_FILENAME: &str = "download";

const REPLACEMENT: char = '_';

/// Characters rejected by Windows in addition to control characters.
const ILLEGAL_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Maps an arbitrary title to a filesystem- and header-safe name.
///
/// - `/ \ < > : " | ? *`, NUL and every other control character become `_`
/// - leading/trailing whitespace and trailing dots are trimmed
/// - reserved device names (`CON`, `nul.txt`, ...) get a `_` appended to the stem
/// - the result is cut to [`MAX_FILENAME_BYTES`] on a char boundary
/// - a result with nothing but `_`, dots and spaces left becomes [`DEFAULT_FILENAME`]
///
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_filename(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| {
            if c.is_control() || ILLEGAL_CHARS.contains(&c) {
                REPLACEMENT
            } else {
                c
            }
        })
        .collect();

    let mut name =
        trim_name(truncate_to_boundary(trim_name(&replaced), MAX_FILENAME_BYTES)).to_string();

    if is_reserved(&name) {
        // Escaping adds one byte, so make room for it first.
        let shortened = trim_name(truncate_to_boundary(&name, MAX_FILENAME_BYTES - 1));
        name = escape_reserved(shortened);
    }

    if is_placeholder(&name) {
        DEFAULT_FILENAME.to_string()
    } else {
        name
    }
}

/// Builds the `Content-Disposition` value for a sanitized name and extension.
///
/// Uses the RFC 5987 extended `filename*` parameter so non-ASCII titles arrive intact:
/// `attachment; filename*=UTF-8''Cool%20Song.m4a`.
pub fn content_disposition(filename: &str, extension: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}.{}",
        urlencoding::encode(filename),
        urlencoding::encode(extension)
    )
}

fn trim_name(name: &str) -> &str {
    name.trim().trim_end_matches(|c: char| c == '.' || c.is_whitespace())
}

/// True when no character of the title survived.
fn is_placeholder(name: &str) -> bool {
    name.chars()
        .all(|c| c == REPLACEMENT || c == '.' || c.is_whitespace())
}

fn is_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

fn escape_reserved(name: &str) -> String {
    match name.find('.') {
        Some(dot) => format!("{}{}{}", &name[..dot], REPLACEMENT, &name[dot..]),
        None => format!("{}{}", name, REPLACEMENT),
    }
}

fn truncate_to_boundary(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<String> {
        vec![
            String::new(),
            "Cool Song".to_string(),
            "Song: \"Live\" / Remix?".to_string(),
            "../../etc/passwd".to_string(),
            "a\\b\\c".to_string(),
            "tab\there\nnewline\r\0nul\u{7f}del\u{85}nel".to_string(),
            "/\\<>:\"|?*".to_string(),
            "?".to_string(),
            "_ . _".to_string(),
            "....".to_string(),
            "   ".to_string(),
            "name. . .".to_string(),
            "CON".to_string(),
            "nul.txt".to_string(),
            "Com1 .mp3".to_string(),
            "LPT9".to_string(),
            "Console".to_string(),
            "日本語のタイトル 🎵".to_string(),
            "é".repeat(150),
            "x".repeat(500),
            format!("{}.", "a".repeat(199)),
            format!("{} tail", "b".repeat(199)),
            format!("CON{}zz", " ".repeat(197)),
            format!("aux.{}", "c".repeat(196)),
        ]
    }

    #[test]
    fn test_plain_title_is_untouched() {
        assert_eq!(sanitize_filename("Cool Song"), "Cool Song");
        assert_eq!(sanitize_filename("日本語のタイトル 🎵"), "日本語のタイトル 🎵");
    }

    #[test]
    fn test_replaces_illegal_characters() {
        assert_eq!(sanitize_filename("Song: \"Live\" / Remix?"), "Song_ _Live_ _ Remix_");
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("line\nbreak\0"), "line_break_");
    }

    #[test]
    fn test_trims_dots_and_spaces() {
        assert_eq!(sanitize_filename("  title .. "), "title");
        assert_eq!(sanitize_filename("...hidden"), "...hidden");
    }

    #[test]
    fn test_reserved_names() {
        assert_eq!(sanitize_filename("CON"), "CON_");
        assert_eq!(sanitize_filename("nul.txt"), "nul_.txt");
        assert_eq!(sanitize_filename("aux "), "aux_");
        assert_eq!(sanitize_filename("Console"), "Console");
    }

    #[test]
    fn test_empty_falls_back_to_default() {
        assert_eq!(sanitize_filename(""), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("   "), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("...."), DEFAULT_FILENAME);
    }

    #[test]
    fn test_only_illegal_characters_fall_back_to_default() {
        assert_eq!(sanitize_filename("/\\<>:\"|?*"), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("///"), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("\0\0"), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("?"), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename(" / . ? "), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename("_a?"), "_a_");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let name = sanitize_filename(&"é".repeat(150));
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert_eq!(name, "é".repeat(100));

        assert_eq!(sanitize_filename(&"x".repeat(500)).len(), MAX_FILENAME_BYTES);
    }

    #[test]
    fn test_output_is_always_safe() {
        for input in samples() {
            let name = sanitize_filename(&input);
            assert!(!name.is_empty(), "empty output for {:?}", input);
            assert!(name.len() <= MAX_FILENAME_BYTES, "too long for {:?}", input);
            assert!(
                !name.chars().any(|c| c.is_control() || ILLEGAL_CHARS.contains(&c)),
                "unsafe output {:?} for {:?}",
                name,
                input
            );
            assert!(!name.ends_with('.') && !name.ends_with(' '), "{:?}", name);
            assert!(!is_reserved(&name), "reserved output {:?}", name);
        }
    }

    #[test]
    fn test_idempotent() {
        for input in samples() {
            let once = sanitize_filename(&input);
            assert_eq!(sanitize_filename(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("Cool Song", "m4a"),
            "attachment; filename*=UTF-8''Cool%20Song.m4a"
        );
    }

    #[test]
    fn test_content_disposition_round_trip() {
        let title = "Song: \"Live\" / Remix? café ♪";
        let name = sanitize_filename(title);
        let header = content_disposition(&name, "m4a");

        assert!(header.is_ascii());
        let encoded = header
            .strip_prefix("attachment; filename*=UTF-8''")
            .and_then(|rest| rest.strip_suffix(".m4a"))
            .unwrap();
        assert_eq!(urlencoding::decode(encoded).unwrap(), name);
    }
}
