use std::path::Path;

/// File read from each tree root to discover its application code.
pub const APP_SETTINGS_FILE: &str = "AppSettings.json";

/// Extension appended to the modified root to name the patch archive.
pub const PATCH_EXTENSION: &str = "forkpatch";

/// Directory names skipped during the tree walk. Entries starting with `.`
/// match any name ending in them (`MyGame.vs`); the rest must match the
/// whole name.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    // Version control
    ".git", ".svn", ".hg",
    // IDE state
    ".vs", ".vscode", ".idea",
    // Build output and caches
    "bin", "obj", "Library", "Temp", "Logs", "Build", "Builds",
];

/// File extensions skipped during the tree walk.
pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] = &[
    "sln", "csproj", "vcxproj", "filters", "user", "suo", "userprefs",
];

/// Deny-list applied to every path under the modified root.
#[derive(Debug, Clone)]
pub struct Exclusions {
    dirs: Vec<String>,
    extensions: Vec<String>,
}

impl Default for Exclusions {
    fn default() -> Self {
        Self {
            dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_ascii_lowercase()).collect(),
            extensions: DEFAULT_EXCLUDED_EXTENSIONS.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }
}

impl Exclusions {
    pub fn with_extra<I, J>(dirs: I, extensions: J) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
    {
        let mut exclusions = Self::default();
        exclusions
            .dirs
            .extend(dirs.into_iter().map(|d| d.to_ascii_lowercase()));
        exclusions.extensions.extend(
            extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase()),
        );
        exclusions
    }

    pub fn excludes_dir(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.dirs.iter().any(|entry| {
            if entry.starts_with('.') {
                name.ends_with(entry.as_str())
            } else {
                name == *entry
            }
        })
    }

    pub fn excludes_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|x| *x == ext))
    }
}

/// Options for building a patch.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub settings_file: String,
    pub exclusions: Exclusions,
    /// Run the second, carriage-return-stripped diff pass on text files.
    pub normalize_line_endings: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            settings_file: APP_SETTINGS_FILE.to_string(),
            exclusions: Exclusions::default(),
            normalize_line_endings: true,
        }
    }
}
