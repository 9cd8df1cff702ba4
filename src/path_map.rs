use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::PatchError;

/// Application codes discovered once per run, one per tree.
#[derive(Debug, Clone)]
pub struct AppCodes {
    pub baseline: String,
    pub modified: String,
}

impl AppCodes {
    pub fn discover(baseline_root: &Path, modified_root: &Path, settings_file: &str) -> Result<Self, PatchError> {
        Ok(Self {
            baseline: discover_app_code(&baseline_root.join(settings_file))?,
            modified: discover_app_code(&modified_root.join(settings_file))?,
        })
    }

    pub fn to_baseline(&self, modified_rel: &str) -> String {
        map_to_baseline(modified_rel, &self.modified, &self.baseline)
    }
}

fn name_field() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r#""Name"\s*:\s*"([^"]+)""#).expect("static regex"))
}

/// Read a project settings file and extract the value of its `"Name"` field.
pub fn discover_app_code(settings_path: &Path) -> Result<String, PatchError> {
    let text = std::fs::read(settings_path)
        .map_err(|_| PatchError::AppCodeNotFound(settings_path.display().to_string()))?;
    let text = String::from_utf8_lossy(&text);
    name_field()
        .captures(&text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| PatchError::AppCodeNotFound(settings_path.display().to_string()))
}

/// Map a modified-tree relative path (forward slashes) to its baseline
/// counterpart. Only a leading match on the file name is substituted;
/// directory components are kept verbatim.
pub fn map_to_baseline(modified_rel: &str, modified_code: &str, baseline_code: &str) -> String {
    let (dir, file_name) = match modified_rel.rfind('/') {
        Some(idx) => modified_rel.split_at(idx + 1),
        None => ("", modified_rel),
    };

    match file_name.strip_prefix(modified_code) {
        Some(rest) if !modified_code.is_empty() => format!("{dir}{baseline_code}{rest}"),
        _ => modified_rel.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_substituted() {
        assert_eq!(map_to_baseline("Foo_Level1.cs", "Foo", "Bar"), "Bar_Level1.cs");
    }

    #[test]
    fn test_non_prefix_untouched() {
        assert_eq!(map_to_baseline("MyFooThing.cs", "Foo", "Bar"), "MyFooThing.cs");
    }

    #[test]
    fn test_exact_match_has_empty_suffix() {
        assert_eq!(map_to_baseline("src/Foo", "Foo", "Bar"), "src/Bar");
    }

    #[test]
    fn test_directories_preserved() {
        assert_eq!(
            map_to_baseline("Foo/Scripts/Foo.Main.cs", "Foo", "Bar"),
            "Foo/Scripts/Bar.Main.cs"
        );
        assert_eq!(map_to_baseline("Foo/readme.txt", "Foo", "Bar"), "Foo/readme.txt");
    }

    #[test]
    fn test_discover_app_code() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("AppSettings.json");
        std::fs::write(&path, "{\n  \"Version\": 3,\n  \"Name\" : \"Dungeon\",\n}").unwrap();
        assert_eq!(discover_app_code(&path).unwrap(), "Dungeon");
    }

    #[test]
    fn test_missing_name_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("AppSettings.json");
        std::fs::write(&path, "{ \"Title\": \"Dungeon\" }").unwrap();
        assert!(matches!(discover_app_code(&path), Err(PatchError::AppCodeNotFound(_))));
        assert!(matches!(
            discover_app_code(&dir.path().join("missing.json")),
            Err(PatchError::AppCodeNotFound(_))
        ));
    }
}
