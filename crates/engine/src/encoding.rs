use crate::config::FallbackEncoding;
use crate::error::{EngineError, Result};
use serde::Serialize;
use std::path::Path;

/// How many bytes are sniffed when detecting an encoding. Detection is
/// deterministic for identical byte content.
pub const DETECT_PREFIX_BYTES: usize = 64 * 1024;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];

/// Text encodings the engine reads and writes back faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-8-bom")]
    Utf8Bom,
    #[serde(rename = "utf-16-le")]
    Utf16Le,
    #[serde(rename = "utf-16-be")]
    Utf16Be,
    #[serde(rename = "latin-1")]
    Latin1,
    #[serde(rename = "windows-1252")]
    Windows1252,
}

impl TextEncoding {
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf8Bom => "utf-8-bom",
            TextEncoding::Utf16Le => "utf-16-le",
            TextEncoding::Utf16Be => "utf-16-be",
            TextEncoding::Latin1 => "latin-1",
            TextEncoding::Windows1252 => "windows-1252",
        }
    }

    /// BOM sniff, then UTF-8 validation over the prefix, then the
    /// configured single-byte fallback. `prefix_truncated` marks that the
    /// prefix was cut at the sniff limit, so an incomplete UTF-8 sequence
    /// at its very end does not disqualify UTF-8.
    pub fn detect(prefix: &[u8], prefix_truncated: bool, fallback: FallbackEncoding) -> Self {
        if prefix.starts_with(&UTF8_BOM) {
            return TextEncoding::Utf8Bom;
        }
        if prefix.starts_with(&UTF16_LE_BOM) {
            return TextEncoding::Utf16Le;
        }
        if prefix.starts_with(&UTF16_BE_BOM) {
            return TextEncoding::Utf16Be;
        }

        match std::str::from_utf8(prefix) {
            Ok(_) => TextEncoding::Utf8,
            Err(err) if prefix_truncated && err.error_len().is_none() => TextEncoding::Utf8,
            Err(_) => match fallback {
                FallbackEncoding::Latin1 => TextEncoding::Latin1,
                FallbackEncoding::Windows1252 => TextEncoding::Windows1252,
            },
        }
    }

    pub fn decode(self, bytes: &[u8], path: &Path) -> Result<String> {
        let encoding_err = |reason: String| EngineError::Encoding {
            path: path.display().to_string(),
            reason,
        };

        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| encoding_err(format!("invalid UTF-8: {e}"))),
            TextEncoding::Utf8Bom => {
                let stripped = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
                String::from_utf8(stripped.to_vec())
                    .map_err(|e| encoding_err(format!("invalid UTF-8: {e}")))
            }
            TextEncoding::Utf16Le => {
                let (text, had_errors) = encoding_rs::UTF_16LE.decode_with_bom_removal(bytes);
                if had_errors {
                    return Err(encoding_err("malformed UTF-16 LE content".into()));
                }
                Ok(text.into_owned())
            }
            TextEncoding::Utf16Be => {
                let (text, had_errors) = encoding_rs::UTF_16BE.decode_with_bom_removal(bytes);
                if had_errors {
                    return Err(encoding_err("malformed UTF-16 BE content".into()));
                }
                Ok(text.into_owned())
            }
            // Latin-1 maps every byte onto U+0000..=U+00FF directly.
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            TextEncoding::Windows1252 => {
                let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
                Ok(text.into_owned())
            }
        }
    }

    pub fn encode(self, text: &str, path: &Path) -> Result<Vec<u8>> {
        let encoding_err = |reason: String| EngineError::Encoding {
            path: path.display().to_string(),
            reason,
        };

        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Utf8Bom => {
                let mut bytes = Vec::with_capacity(text.len() + UTF8_BOM.len());
                bytes.extend_from_slice(&UTF8_BOM);
                bytes.extend_from_slice(text.as_bytes());
                Ok(bytes)
            }
            TextEncoding::Utf16Le => {
                let mut bytes = Vec::with_capacity(text.len() * 2 + 2);
                bytes.extend_from_slice(&UTF16_LE_BOM);
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(bytes)
            }
            TextEncoding::Utf16Be => {
                let mut bytes = Vec::with_capacity(text.len() * 2 + 2);
                bytes.extend_from_slice(&UTF16_BE_BOM);
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                }
                Ok(bytes)
            }
            TextEncoding::Latin1 => {
                let mut bytes = Vec::with_capacity(text.len());
                for ch in text.chars() {
                    let code = ch as u32;
                    if code > 0xFF {
                        return Err(encoding_err(format!(
                            "character {ch:?} is not representable in Latin-1"
                        )));
                    }
                    bytes.push(code as u8);
                }
                Ok(bytes)
            }
            TextEncoding::Windows1252 => {
                let (bytes, _, had_unmappable) = encoding_rs::WINDOWS_1252.encode(text);
                if had_unmappable {
                    return Err(encoding_err(
                        "content contains characters not representable in Windows-1252".into(),
                    ));
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

/// Line terminator convention of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }

    /// Dominant terminator of `text`. Mixed terminators resolve to the more
    /// frequent one; a tie resolves to the first terminator seen. Files
    /// without any terminator default to LF.
    pub fn detect(text: &str) -> Self {
        let mut crlf = 0usize;
        let mut bare_lf = 0usize;
        let mut first: Option<LineEnding> = None;

        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'\n' {
                if i > 0 && bytes[i - 1] == b'\r' {
                    crlf += 1;
                    first.get_or_insert(LineEnding::CrLf);
                } else {
                    bare_lf += 1;
                    first.get_or_insert(LineEnding::Lf);
                }
            }
            i += 1;
        }

        match crlf.cmp(&bare_lf) {
            std::cmp::Ordering::Greater => LineEnding::CrLf,
            std::cmp::Ordering::Less => LineEnding::Lf,
            std::cmp::Ordering::Equal => first.unwrap_or(LineEnding::Lf),
        }
    }
}

/// Split text into logical lines (terminators stripped), reporting whether
/// the text ended with a terminator. An empty text has zero lines.
pub(crate) fn split_lines(text: &str) -> (Vec<String>, bool) {
    if text.is_empty() {
        return (Vec::new(), false);
    }
    let trailing_newline = text.ends_with('\n');
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();
    if trailing_newline {
        lines.pop();
    }
    (lines, trailing_newline)
}

/// Rebuild file text from logical lines with a uniform terminator.
pub(crate) fn join_lines(lines: &[String], ending: LineEnding, trailing_newline: bool) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut text = lines.join(ending.as_str());
    if trailing_newline {
        text.push_str(ending.as_str());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn p() -> PathBuf {
        PathBuf::from("test.txt")
    }

    #[test]
    fn detects_boms() {
        let fallback = FallbackEncoding::Windows1252;
        assert_eq!(
            TextEncoding::detect(b"\xEF\xBB\xBFhello", false, fallback),
            TextEncoding::Utf8Bom
        );
        assert_eq!(
            TextEncoding::detect(b"\xFF\xFEh\x00", false, fallback),
            TextEncoding::Utf16Le
        );
        assert_eq!(
            TextEncoding::detect(b"\xFE\xFF\x00h", false, fallback),
            TextEncoding::Utf16Be
        );
    }

    #[test]
    fn detects_utf8_and_fallback() {
        assert_eq!(
            TextEncoding::detect("héllo".as_bytes(), false, FallbackEncoding::Windows1252),
            TextEncoding::Utf8
        );
        // 0xE9 alone is not valid UTF-8.
        assert_eq!(
            TextEncoding::detect(b"h\xE9llo", false, FallbackEncoding::Windows1252),
            TextEncoding::Windows1252
        );
        assert_eq!(
            TextEncoding::detect(b"h\xE9llo", false, FallbackEncoding::Latin1),
            TextEncoding::Latin1
        );
    }

    #[test]
    fn truncated_prefix_does_not_disqualify_utf8() {
        // Multi-byte char cut at the sniff boundary.
        let text = "é".as_bytes();
        let cut = &text[..1];
        assert_eq!(
            TextEncoding::detect(cut, true, FallbackEncoding::Windows1252),
            TextEncoding::Utf8
        );
        assert_eq!(
            TextEncoding::detect(cut, false, FallbackEncoding::Windows1252),
            TextEncoding::Windows1252
        );
    }

    #[test]
    fn round_trips_every_encoding() {
        let text = "héllo wörld";
        for encoding in [
            TextEncoding::Utf8,
            TextEncoding::Utf8Bom,
            TextEncoding::Utf16Le,
            TextEncoding::Utf16Be,
            TextEncoding::Latin1,
            TextEncoding::Windows1252,
        ] {
            let bytes = encoding.encode(text, &p()).unwrap();
            let decoded = encoding.decode(&bytes, &p()).unwrap();
            assert_eq!(decoded, text, "round trip through {}", encoding.name());
        }
    }

    #[test]
    fn encoded_bom_is_redetected() {
        for encoding in [
            TextEncoding::Utf8Bom,
            TextEncoding::Utf16Le,
            TextEncoding::Utf16Be,
        ] {
            let bytes = encoding.encode("abc", &p()).unwrap();
            assert_eq!(
                TextEncoding::detect(&bytes, false, FallbackEncoding::Windows1252),
                encoding
            );
        }
    }

    #[test]
    fn latin1_rejects_unmappable() {
        assert!(TextEncoding::Latin1.encode("日本語", &p()).is_err());
        assert!(TextEncoding::Windows1252.encode("日本語", &p()).is_err());
    }

    #[test]
    fn dominant_line_ending_wins() {
        assert_eq!(LineEnding::detect("a\nb\nc"), LineEnding::Lf);
        assert_eq!(LineEnding::detect("a\r\nb\r\nc\n"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("a\r\nb\nc\nd"), LineEnding::Lf);
        // Tie goes to the first terminator seen.
        assert_eq!(LineEnding::detect("a\r\nb\nc"), LineEnding::CrLf);
        assert_eq!(LineEnding::detect("no terminator"), LineEnding::Lf);
    }

    #[test]
    fn split_and_join_preserve_shape() {
        let (lines, trailing) = split_lines("a\r\nb\r\n");
        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        assert!(trailing);
        assert_eq!(join_lines(&lines, LineEnding::CrLf, true), "a\r\nb\r\n");

        let (lines, trailing) = split_lines("a\nb");
        assert_eq!(lines.len(), 2);
        assert!(!trailing);
        assert_eq!(join_lines(&lines, LineEnding::Lf, false), "a\nb");

        let (lines, trailing) = split_lines("");
        assert!(lines.is_empty());
        assert!(!trailing);
    }
}
