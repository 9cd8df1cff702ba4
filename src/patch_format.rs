use crate::error::PatchError;

pub const FORMAT_VERSION: u32 = 1;

/// Name of the archive entry carrying the format version.
pub const MANIFEST_ENTRY: &str = "manifest";

/// Per-file outcome of comparing a modified file against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Byte-identical to its baseline counterpart.
    Same,
    /// No baseline counterpart exists.
    New,
    /// Baseline counterpart exists but differs.
    Diff,
}

impl Classification {
    pub fn prefix(self) -> &'static str {
        match self {
            Classification::Same => "same",
            Classification::New => "new",
            Classification::Diff => "diff",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "same" => Some(Classification::Same),
            "new" => Some(Classification::New),
            "diff" => Some(Classification::Diff),
            _ => None,
        }
    }
}

/// Build the archive entry name `<classification>/<modified relative path>`.
/// `modified_rel` must already use `/` separators.
pub fn entry_name(class: Classification, modified_rel: &str) -> String {
    format!("{}/{}", class.prefix(), modified_rel)
}

/// Split an archive entry name back into its classification and path.
pub fn parse_entry_name(name: &str) -> Result<(Classification, &str), PatchError> {
    let (prefix, rel) = name
        .split_once('/')
        .ok_or_else(|| PatchError::UnknownEntry(name.to_string()))?;
    let class =
        Classification::from_prefix(prefix).ok_or_else(|| PatchError::UnknownEntry(name.to_string()))?;
    if rel.is_empty() {
        return Err(PatchError::UnknownEntry(name.to_string()));
    }
    Ok((class, rel))
}

/// Validate the manifest body. Only the current version is accepted.
pub fn check_manifest(body: &[u8]) -> Result<(), PatchError> {
    let found = String::from_utf8_lossy(body);
    match found.trim().parse::<u32>() {
        Ok(FORMAT_VERSION) => Ok(()),
        _ => Err(PatchError::UnsupportedVersion {
            found: found.into_owned(),
            expected: FORMAT_VERSION,
        }),
    }
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub files_same: usize,
    pub files_new: usize,
    pub files_diff: usize,
    pub files_excluded: usize,
    pub archive_bytes: u64,
}

#[derive(Debug, Default)]
pub struct ApplySummary {
    pub files_copied: usize,
    pub files_added: usize,
    pub files_patched: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_roundtrip() {
        let name = entry_name(Classification::Diff, "Assets/Scripts/Foo_Level1.cs");
        assert_eq!(name, "diff/Assets/Scripts/Foo_Level1.cs");
        let (class, rel) = parse_entry_name(&name).unwrap();
        assert_eq!(class, Classification::Diff);
        assert_eq!(rel, "Assets/Scripts/Foo_Level1.cs");
    }

    #[test]
    fn test_entry_name_keeps_backslash() {
        let name = entry_name(Classification::New, "Docs/a\\b.txt");
        assert_eq!(name, "new/Docs/a\\b.txt");
        assert_eq!(parse_entry_name(&name).unwrap().1, "Docs/a\\b.txt");
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        assert!(matches!(
            parse_entry_name("patch/readme.txt"),
            Err(PatchError::UnknownEntry(_))
        ));
        assert!(matches!(parse_entry_name("same/"), Err(PatchError::UnknownEntry(_))));
        assert!(matches!(parse_entry_name("readme.txt"), Err(PatchError::UnknownEntry(_))));
    }

    #[test]
    fn test_manifest_versions() {
        assert!(check_manifest(b"1").is_ok());
        assert!(check_manifest(b"1\n").is_ok());
        assert!(matches!(
            check_manifest(b"2"),
            Err(PatchError::UnsupportedVersion { .. })
        ));
        assert!(check_manifest(b"").is_err());
    }
}
