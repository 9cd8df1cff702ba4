use std::path::Path;

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Extensions that are always treated as text.
fn is_known_text(ext: &str) -> bool {
    matches!(
        ext,
        // Source
        "cs" | "c" | "h" | "cpp" | "hpp" | "js" | "ts" | "py" | "lua"
        // Shaders
        | "shader" | "cginc" | "hlsl" | "glsl" | "compute"
        // Data and config
        | "json" | "xml" | "yaml" | "yml" | "ini" | "cfg" | "toml" | "csv"
        // Engine assets serialized as text
        | "asset" | "prefab" | "unity" | "mat" | "meta" | "asmdef" | "uxml" | "uss"
        // Docs
        | "txt" | "md" | "html" | "htm" | "css"
    )
}

/// Extensions that are never sniffed: their content is binary even when a
/// sample happens to look printable.
fn is_known_binary(ext: &str) -> bool {
    matches!(
        ext,
        // Images
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "ico" | "tiff" | "tif" | "tga" | "psd" | "exr"
        // Audio and video
        | "mp3" | "wav" | "ogg" | "flac" | "mp4" | "mov" | "webm"
        // Archives
        | "zip" | "gz" | "bz2" | "xz" | "zst" | "7z" | "rar"
        // Compiled code
        | "dll" | "exe" | "so" | "dylib" | "pdb" | "lib" | "a" | "o"
        // Models and fonts
        | "fbx" | "obj" | "blend" | "ttf" | "otf" | "woff" | "woff2"
        // Other
        | "pdf" | "bin" | "dat"
    )
}

/// Text if the raw bytes contain no control byte below 32 other than tab,
/// line feed and carriage return.
fn looks_like_text(data: &[u8]) -> bool {
    !data
        .iter()
        .any(|&b| b < 32 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Classify a file as text for the carriage-return diff pass.
pub fn is_text_file(path: &Path, data: &[u8]) -> bool {
    match extension(path).as_deref() {
        Some(ext) if is_known_text(ext) => true,
        Some(ext) if is_known_binary(ext) => false,
        _ => looks_like_text(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_wins_over_content() {
        assert!(is_text_file(Path::new("Scripts/Game.CS"), b"\x00\x01"));
    }

    #[test]
    fn test_denylist_wins_over_content() {
        assert!(!is_text_file(Path::new("Art/logo.png"), b"plain ascii"));
    }

    #[test]
    fn test_sniff_unknown_extensions() {
        assert!(is_text_file(Path::new("LICENSE"), b"MIT\r\n\tfree\n"));
        assert!(!is_text_file(Path::new("blob.xyz"), b"abc\x00def"));
        assert!(!is_text_file(Path::new("blob.xyz"), b"\x1b[0m"));
    }
}
