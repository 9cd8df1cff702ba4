use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::archive::ArchiveReader;
use crate::error::PatchError;
use crate::instruction::{DiffBodyReader, Instruction};
use crate::patch_format::{check_manifest, parse_entry_name, ApplySummary, Classification, MANIFEST_ENTRY};
use crate::util;

/// Replay diff instructions against a baseline stream, writing the
/// reconstructed file to `out`. The baseline is read strictly forward.
pub fn replay<R, B, W>(body: &mut DiffBodyReader<R>, baseline: &mut B, out: &mut W) -> Result<(), PatchError>
where
    R: BufRead,
    B: Read,
    W: Write,
{
    while let Some(instruction) = body.next_instruction()? {
        match instruction {
            Instruction::Equal(n) => {
                let copied = io::copy(&mut baseline.by_ref().take(n), out)?;
                if copied < n {
                    return Err(PatchError::BaselineExhausted {
                        expected: n,
                        actual: copied,
                    });
                }
            }
            Instruction::Delete(n) => {
                let skipped = io::copy(&mut baseline.by_ref().take(n), &mut io::sink())?;
                if skipped < n {
                    return Err(PatchError::BaselineExhausted {
                        expected: n,
                        actual: skipped,
                    });
                }
            }
            Instruction::Insert(text) => out.write_all(&text)?,
        }
    }
    out.flush()?;
    Ok(())
}

fn baseline_file(baseline_root: &Path, baseline_rel: &str) -> Result<PathBuf, PatchError> {
    let path = util::safe_join(baseline_root, baseline_rel)?;
    if !path.is_file() {
        return Err(PatchError::MissingBaseline(baseline_rel.to_string()));
    }
    Ok(path)
}

fn body_as_path(data: &[u8]) -> Result<&str, PatchError> {
    std::str::from_utf8(data).map_err(|_| PatchError::MissingBaselinePath)
}

fn write_reconstructed<R: BufRead>(
    body: &mut DiffBodyReader<R>,
    baseline_path: &Path,
    out_path: &Path,
) -> Result<()> {
    let baseline = File::open(baseline_path)
        .with_context(|| format!("Failed to open baseline file: {}", baseline_path.display()))?;
    let out = File::create(out_path)
        .with_context(|| format!("Failed to create file: {}", out_path.display()))?;
    let mut baseline = BufReader::new(baseline);
    let mut out = BufWriter::new(out);
    replay(body, &mut baseline, &mut out)?;
    Ok(())
}

/// Reconstruct one `diff` entry at `out_path`. A failed replay removes the
/// partially written file.
fn apply_diff_entry(baseline_root: &Path, data: &[u8], out_path: &Path) -> Result<()> {
    let mut body = DiffBodyReader::new(data);
    let baseline_rel = body.baseline_path()?;
    let baseline_path = baseline_file(baseline_root, &baseline_rel)?;

    let result = write_reconstructed(&mut body, &baseline_path, out_path)
        .with_context(|| format!("Failed to replay diff against {baseline_rel}"));
    if result.is_err() {
        let _ = std::fs::remove_file(out_path);
    }
    result
}

fn prepare_output_dir(output_dir: &Path) -> Result<(), PatchError> {
    if output_dir.exists() {
        return Err(PatchError::OutputExists(output_dir.display().to_string()));
    }
    std::fs::create_dir_all(output_dir)?;
    Ok(())
}

fn apply_blocking(baseline_root: &Path, patch_path: &Path, output_dir: &Path) -> Result<ApplySummary> {
    let mut reader = ArchiveReader::open(patch_path)
        .with_context(|| format!("Failed to open patch archive: {}", patch_path.display()))?;

    match reader.next_entry()? {
        Some(entry) if entry.name == MANIFEST_ENTRY => check_manifest(&entry.data)?,
        _ => return Err(PatchError::MissingManifest.into()),
    }

    prepare_output_dir(output_dir)?;

    let mut summary = ApplySummary::default();

    for entry in reader {
        let entry = entry?;
        let (class, rel) = parse_entry_name(&entry.name)?;
        let out_path = util::safe_join(output_dir, rel)?;

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        match class {
            Classification::Same => {
                let baseline_rel = body_as_path(&entry.data)?;
                let baseline_path = baseline_file(baseline_root, baseline_rel)?;
                std::fs::copy(&baseline_path, &out_path).with_context(|| {
                    format!("Failed to copy {} to {}", baseline_path.display(), out_path.display())
                })?;
                summary.files_copied += 1;
            }
            Classification::New => {
                std::fs::write(&out_path, &entry.data)
                    .with_context(|| format!("Failed to write file: {}", out_path.display()))?;
                summary.files_added += 1;
            }
            Classification::Diff => {
                apply_diff_entry(baseline_root, &entry.data, &out_path)
                    .with_context(|| format!("Failed to patch {rel}"))?;
                summary.files_patched += 1;
            }
        }
        log::debug!("{} {rel}", class.prefix());
    }

    Ok(summary)
}

/// Default output location: the patch path with its extension stripped.
pub fn default_output(patch_path: &Path) -> PathBuf {
    patch_path.with_extension("")
}

/// Rebuild the modified tree into `output_dir` from `baseline_root` and a
/// patch archive. Refuses to touch an existing output path.
pub async fn apply_patch(baseline_root: &Path, patch_path: &Path, output_dir: &Path) -> Result<ApplySummary> {
    let baseline_root = baseline_root
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize baseline: {}", baseline_root.display()))?;
    let patch_path = patch_path.to_path_buf();
    let output_dir = output_dir.to_path_buf();

    log::info!(
        "applying {} over {} into {}",
        patch_path.display(),
        baseline_root.display(),
        output_dir.display()
    );

    tokio::task::spawn_blocking(move || apply_blocking(&baseline_root, &patch_path, &output_dir)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use tempfile::TempDir;

    fn run(body: &[u8], baseline: &[u8]) -> Result<Vec<u8>, PatchError> {
        let mut reader = DiffBodyReader::new(body);
        let mut out = Vec::new();
        replay(&mut reader, &mut &baseline[..], &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_replay_substitution() {
        assert_eq!(run(b"=2\n-1\n+X\n=3\n", b"ABCDEF").unwrap(), b"ABXDEF");
    }

    #[test]
    fn test_replay_binary_insert() {
        let out = run(b"-3\n+\\r\\n\x00\xff\\\\\n", b"abc").unwrap();
        assert_eq!(out, b"\r\n\x00\xff\\");
    }

    #[test]
    fn test_replay_exhausted_baseline() {
        assert!(matches!(
            run(b"=10\n", b"12345"),
            Err(PatchError::BaselineExhausted { expected: 10, actual: 5 })
        ));
        assert!(matches!(
            run(b"-6\n", b"12345"),
            Err(PatchError::BaselineExhausted { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_replay_unknown_prefix() {
        assert!(matches!(
            run(b"=1\n#2\n", b"abc"),
            Err(PatchError::UnknownInstruction(_))
        ));
    }

    #[test]
    fn test_failed_diff_entry_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("short.txt"), b"12345").unwrap();
        let out_path = dir.path().join("short.txt");

        let err = apply_diff_entry(&base, b"short.txt\n=10\n", &out_path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::BaselineExhausted { .. })
        ));
        assert!(!out_path.exists());
    }

    #[test]
    fn test_missing_baseline_for_diff() {
        let dir = TempDir::new().unwrap();
        let err = apply_diff_entry(dir.path(), b"gone.txt\n=1\n", &dir.path().join("out")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::MissingBaseline(_))
        ));
    }

    fn write_patch(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ArchiveWriter::create(path).unwrap();
        for (name, data) in entries {
            writer.add(name, data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_apply_dispatches_by_classification() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("base");
        std::fs::create_dir_all(base.join("Scripts")).unwrap();
        std::fs::write(base.join("Scripts/Bar_Main.cs"), b"ABCDEF").unwrap();
        std::fs::write(base.join("readme.txt"), b"read me").unwrap();

        let patch = dir.path().join("Game.forkpatch");
        write_patch(
            &patch,
            &[
                ("manifest", b"1"),
                ("diff/Scripts/Foo_Main.cs", b"Scripts/Bar_Main.cs\n=2\n-1\n+X\n=3\n"),
                ("new/Art/icon.bin", &[0, 1, 2, 13, 10]),
                ("same/readme.txt", b"readme.txt"),
            ],
        );

        let out = default_output(&patch);
        let summary = apply_blocking(&base, &patch, &out).unwrap();
        assert_eq!(summary.files_patched, 1);
        assert_eq!(summary.files_added, 1);
        assert_eq!(summary.files_copied, 1);
        assert_eq!(std::fs::read(out.join("Scripts/Foo_Main.cs")).unwrap(), b"ABXDEF");
        assert_eq!(std::fs::read(out.join("Art/icon.bin")).unwrap(), vec![0, 1, 2, 13, 10]);
        assert_eq!(std::fs::read(out.join("readme.txt")).unwrap(), b"read me");
    }

    #[test]
    fn test_apply_refuses_existing_output() {
        let dir = TempDir::new().unwrap();
        let patch = dir.path().join("Game.forkpatch");
        write_patch(&patch, &[("manifest", b"1")]);

        let out = dir.path().join("Game");
        std::fs::write(&out, b"occupied").unwrap();
        let err = apply_blocking(dir.path(), &patch, &out).unwrap_err();
        assert!(matches!(err.downcast_ref::<PatchError>(), Some(PatchError::OutputExists(_))));

        std::fs::remove_file(&out).unwrap();
        std::fs::create_dir(&out).unwrap();
        let err = apply_blocking(dir.path(), &patch, &out).unwrap_err();
        assert!(matches!(err.downcast_ref::<PatchError>(), Some(PatchError::OutputExists(_))));
    }

    #[test]
    fn test_apply_rejects_bad_manifest() {
        let dir = TempDir::new().unwrap();
        let patch = dir.path().join("v2.forkpatch");
        write_patch(&patch, &[("manifest", b"2")]);
        let err = apply_blocking(dir.path(), &patch, &dir.path().join("v2")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PatchError>(),
            Some(PatchError::UnsupportedVersion { .. })
        ));
        assert!(!dir.path().join("v2").exists());

        let patch = dir.path().join("none.forkpatch");
        write_patch(&patch, &[("new/a.txt", b"a")]);
        let err = apply_blocking(dir.path(), &patch, &dir.path().join("none")).unwrap_err();
        assert!(matches!(err.downcast_ref::<PatchError>(), Some(PatchError::MissingManifest)));
    }

    #[test]
    fn test_apply_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let patch = dir.path().join("evil.forkpatch");
        write_patch(&patch, &[("manifest", b"1"), ("new/../escape.txt", b"x")]);
        let err = apply_blocking(dir.path(), &patch, &dir.path().join("evil")).unwrap_err();
        assert!(matches!(err.downcast_ref::<PatchError>(), Some(PatchError::UnsafePath(_))));
        assert!(!dir.path().join("escape.txt").exists());
    }
}
