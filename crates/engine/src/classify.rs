//! File classification helpers: MIME guessing by extension, binary-content
//! sniffing and the directory noise filter shared by search and walks.

use std::io::Read;
use std::path::Path;

/// Directories that are never worth traversing: VCS metadata, package
/// caches and build output.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    ".cache",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    "build",
    "dist",
    "coverage",
    ".next",
    "tmp",
    "temp",
];

pub(crate) fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.iter().any(|d| name.eq_ignore_ascii_case(d))
}

const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "dat", "db", "sqlite", "jpg", "jpeg", "png", "gif", "bmp",
    "ico", "tiff", "webp", "mp3", "mp4", "avi", "mov", "wav", "flac", "ogg", "pdf", "doc", "docx",
    "xls", "xlsx", "ppt", "pptx", "zip", "rar", "7z", "tar", "gz", "bz2", "woff", "woff2", "ttf",
    "otf", "eot", "class", "o", "a", "rlib", "wasm",
];

const BINARY_SAMPLE_BYTES: usize = 512;
const MIN_PRINTABLE_RATIO: f64 = 0.7;

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether `path` is likely binary, judged by extension first and then by
/// sampling the leading bytes (NUL bytes or a low printable ratio).
/// Unreadable files count as binary so callers skip them.
pub(crate) fn is_likely_binary(path: &Path) -> bool {
    if let Some(ext) = extension_of(path) {
        if BINARY_EXTENSIONS.iter().any(|b| *b == ext) {
            return true;
        }
    }

    let mut sample = [0u8; BINARY_SAMPLE_BYTES];
    let read = match std::fs::File::open(path).and_then(|mut f| f.read(&mut sample)) {
        Ok(n) => n,
        Err(_) => return true,
    };
    if read == 0 {
        return false;
    }

    let sample = &sample[..read];
    if sample.contains(&0) {
        return true;
    }
    let printable = sample
        .iter()
        .filter(|&&b| (32..127).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    (printable as f64) / (read as f64) < MIN_PRINTABLE_RATIO
}

/// Extension-based MIME classification; `None` for unknown extensions.
pub fn mime_type(path: &Path) -> Option<&'static str> {
    let ext = extension_of(path)?;
    let mime = match ext.as_str() {
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "js" | "mjs" | "cjs" => "text/javascript",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "c" | "h" => "text/x-c",
        "cpp" | "cc" | "hpp" => "text/x-c++",
        "java" => "text/x-java",
        "go" => "text/x-go",
        "rb" => "text/x-ruby",
        "sh" | "bash" => "application/x-sh",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn skip_list_is_case_insensitive() {
        assert!(is_skipped_dir(".git"));
        assert!(is_skipped_dir("Node_Modules"));
        assert!(!is_skipped_dir("src"));
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_type(Path::new("a/b/readme.md")), Some("text/markdown"));
        assert_eq!(mime_type(Path::new("main.RS")), Some("text/x-rust"));
        assert_eq!(mime_type(Path::new("mystery.xyz")), None);
        assert_eq!(mime_type(Path::new("no_extension")), None);
    }

    #[test]
    fn binary_detection_by_extension_and_content() {
        let temp = tempdir().unwrap();

        let image = temp.path().join("photo.png");
        std::fs::write(&image, b"not really an image").unwrap();
        assert!(is_likely_binary(&image));

        let with_nul = temp.path().join("data.foo");
        std::fs::write(&with_nul, b"abc\x00def").unwrap();
        assert!(is_likely_binary(&with_nul));

        let text = temp.path().join("notes.foo");
        std::fs::write(&text, b"plain old text\nwith lines\n").unwrap();
        assert!(!is_likely_binary(&text));

        let empty = temp.path().join("empty.foo");
        std::fs::write(&empty, b"").unwrap();
        assert!(!is_likely_binary(&empty));
    }
}
