use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveWriter;
use crate::config::BuildOptions;
use crate::edit_script::{DiffService, EditScriptAdapter, MyersDiff, Pass};
use crate::file_kind;
use crate::instruction;
use crate::path_map::AppCodes;
use crate::patch_format::{entry_name, BuildSummary, Classification, FORMAT_VERSION, MANIFEST_ENTRY};
use crate::util::{self, FileEntry};

/// Where an entry body comes from when the archive is written.
#[derive(Debug)]
pub enum EntryBody {
    Inline(Vec<u8>),
    /// Raw content of a new file, read only when its entry is written.
    File(PathBuf),
}

#[derive(Debug)]
pub struct PlannedEntry {
    pub class: Classification,
    pub modified_rel: String,
    pub body: EntryBody,
}

/// Decide how one modified file is carried in the patch.
pub fn classify_file<D: DiffService>(
    baseline_root: &Path,
    file: &FileEntry,
    codes: &AppCodes,
    adapter: &EditScriptAdapter<D>,
) -> Result<PlannedEntry> {
    let baseline_rel = codes.to_baseline(&file.relative_path);
    let baseline_path = baseline_root.join(&baseline_rel);

    let planned = |class: Classification, body: EntryBody| PlannedEntry {
        class,
        modified_rel: file.relative_path.clone(),
        body,
    };

    let baseline_meta = match std::fs::metadata(&baseline_path) {
        Ok(meta) if meta.is_file() => meta,
        _ => {
            log::debug!("new  {}", file.relative_path);
            return Ok(planned(Classification::New, EntryBody::File(file.full_path.clone())));
        }
    };

    let same_body = || EntryBody::Inline(baseline_rel.clone().into_bytes());

    // Identical sizes: a streaming hash settles most unchanged files without diffing.
    if baseline_meta.len() == file.size
        && util::hash_file_streaming(&baseline_path)? == util::hash_file_streaming(&file.full_path)?
    {
        log::debug!("same {}", file.relative_path);
        return Ok(planned(Classification::Same, same_body()));
    }

    let baseline = util::mmap_file(&baseline_path)?;
    let modified = util::mmap_file(&file.full_path)?;
    let is_text = file_kind::is_text_file(&baseline_path, &baseline);

    let (script, pass) = adapter
        .diff(&baseline, &modified, is_text)
        .with_context(|| format!("Failed to diff {} against {}", file.relative_path, baseline_rel))?;

    if pass == Pass::CarriageReturnsStripped {
        log::debug!("line endings normalized for {}", file.relative_path);
    }

    if script.is_identity(&baseline) {
        log::debug!("same {}", file.relative_path);
        return Ok(planned(Classification::Same, same_body()));
    }

    log::debug!("diff {} ({} instructions)", file.relative_path, script.len());
    let body = instruction::encode_diff_body(&baseline_rel, &script)
        .with_context(|| format!("Cannot patch {}", file.relative_path))?;
    Ok(planned(Classification::Diff, EntryBody::Inline(body)))
}

fn write_archive(output: &Path, entries: &[PlannedEntry]) -> Result<u64> {
    let mut writer = ArchiveWriter::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;

    writer.add(MANIFEST_ENTRY, FORMAT_VERSION.to_string().as_bytes())?;

    for entry in entries {
        let name = entry_name(entry.class, &entry.modified_rel);
        match &entry.body {
            EntryBody::Inline(data) => writer.add(&name, data)?,
            EntryBody::File(path) => {
                let data = std::fs::read(path)
                    .with_context(|| format!("Failed to read file: {}", path.display()))?;
                writer.add(&name, &data)?;
            }
        }
    }

    writer
        .finish()
        .with_context(|| format!("Failed to finish patch archive: {}", output.display()))?;

    let size = std::fs::metadata(output)
        .with_context(|| format!("Failed to read metadata: {}", output.display()))?
        .len();
    Ok(size)
}

/// Default archive location: `<modified root>.<patch extension>`.
pub fn default_output(modified_root: &Path) -> PathBuf {
    let mut name = modified_root.as_os_str().to_os_string();
    name.push(".");
    name.push(crate::config::PATCH_EXTENSION);
    PathBuf::from(name)
}

/// Create a patch archive describing how `modified_root` differs from
/// `baseline_root`.
/// Uses Tokio to overlap discovery with the tree walk and Rayon for parallel
/// hashing/diffing; entries are written in sorted path order.
pub async fn create_patch(
    baseline_root: &Path,
    modified_root: &Path,
    output: &Path,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    // Stage 1: Discover app codes while walking the modified tree
    let baseline_owned = baseline_root.to_path_buf();
    let modified_owned = modified_root.to_path_buf();
    let settings_file = options.settings_file.clone();
    let modified_for_walk = modified_root.to_path_buf();
    let exclusions = options.exclusions.clone();

    let (codes, walked) = tokio::try_join!(
        tokio::task::spawn_blocking(move || {
            AppCodes::discover(&baseline_owned, &modified_owned, &settings_file)
        }),
        tokio::task::spawn_blocking(move || util::walk_files(&modified_for_walk, &exclusions)),
    )?;

    let codes = codes.context("Failed to discover application codes")?;
    let walked = walked?;

    log::info!(
        "app codes: baseline {:?}, modified {:?}; {} files to compare, {} excluded",
        codes.baseline,
        codes.modified,
        walked.files.len(),
        walked.excluded
    );

    // Stage 2: Classify every file (Rayon par_iter inside spawn_blocking)
    let baseline_owned = baseline_root.to_path_buf();
    let adapter = EditScriptAdapter::new(MyersDiff::default(), options.normalize_line_endings);
    let files = walked.files;

    let planned = tokio::task::spawn_blocking(move || -> Result<Vec<PlannedEntry>> {
        files
            .par_iter()
            .map(|file| classify_file(&baseline_owned, file, &codes, &adapter))
            .collect()
    })
    .await??;

    // Stage 3: Serialize, compress, write
    let mut summary = BuildSummary {
        files_excluded: walked.excluded,
        ..BuildSummary::default()
    };
    for entry in &planned {
        match entry.class {
            Classification::Same => summary.files_same += 1,
            Classification::New => summary.files_new += 1,
            Classification::Diff => summary.files_diff += 1,
        }
    }

    let output_owned = output.to_path_buf();
    summary.archive_bytes =
        tokio::task::spawn_blocking(move || write_archive(&output_owned, &planned)).await??;

    log::info!("wrote {} ({} bytes)", output.display(), summary.archive_bytes);
    Ok(summary)
}
