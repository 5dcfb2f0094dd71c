//! Replacement module: moves a validated encode into place.
//!
//! Three mutually exclusive outcomes, chosen by configuration: keep-original
//! places the encode beside the untouched source under a derived name,
//! backup mode copies the source into a backup directory before replacing,
//! and the default replaces in place. Rename is tried first and falls back
//! to copy-and-remove across filesystems.

use crate::encode::output_extension;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during file replacement.
#[derive(Debug, Error)]
pub enum ReplaceError {
    /// Failed to copy the original into the backup directory.
    #[error("Failed to back up original: {0}")]
    BackupFailed(std::io::Error),

    /// Failed to move the encoded file into place.
    #[error("Failed to place encoded file: {0}")]
    PlaceFailed(std::io::Error),

    /// Failed to remove the superseded original.
    #[error("Failed to remove original: {0}")]
    RemoveOriginalFailed(std::io::Error),
}

/// How a validated encode is disposed of relative to the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Leave the original untouched; the encode lands beside it.
    KeepOriginal,
    /// Copy the original into this directory, then replace in place.
    Backup(PathBuf),
    /// Replace in place.
    InPlace,
}

/// Path the replacement lands at: same stem as the original, with the
/// container extension the encode was written in.
pub fn replacement_target(original: &Path) -> PathBuf {
    original.with_extension(output_extension(original))
}

/// Derived sibling name for keep-original mode: `<stem>-encoded.<ext>`.
pub fn encoded_sibling_path(original: &Path) -> PathBuf {
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = format!("{}-encoded.{}", stem, output_extension(original));
    original.with_file_name(name)
}

/// Moves a file, falling back to copy-and-remove across filesystems.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Applies the configured replacement mode to a validated encode.
///
/// Returns the path the encoded file ended up at. The original is only ever
/// removed after the encode has landed; on any failure both files are left
/// for inspection.
pub fn apply_replacement(
    original: &Path,
    encoded_tmp: &Path,
    mode: &ReplaceMode,
) -> Result<PathBuf, ReplaceError> {
    match mode {
        ReplaceMode::KeepOriginal => {
            let sibling = encoded_sibling_path(original);
            move_file(encoded_tmp, &sibling).map_err(ReplaceError::PlaceFailed)?;
            Ok(sibling)
        }
        ReplaceMode::Backup(backup_dir) => {
            fs::create_dir_all(backup_dir).map_err(ReplaceError::BackupFailed)?;
            let backup = backup_dir.join(original.file_name().unwrap_or_default());
            fs::copy(original, &backup).map_err(ReplaceError::BackupFailed)?;
            replace_in_place(original, encoded_tmp)
        }
        ReplaceMode::InPlace => replace_in_place(original, encoded_tmp),
    }
}

fn replace_in_place(original: &Path, encoded_tmp: &Path) -> Result<PathBuf, ReplaceError> {
    let target = replacement_target(original);
    move_file(encoded_tmp, &target).map_err(ReplaceError::PlaceFailed)?;

    // A container rewrap (avi/mp4 -> mkv) leaves the old file behind.
    if target != original {
        fs::remove_file(original).map_err(ReplaceError::RemoveOriginalFailed)?;
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(content).unwrap();
    }

    #[test]
    fn test_replacement_target_keeps_mkv() {
        assert_eq!(
            replacement_target(Path::new("/m/film.mkv")),
            PathBuf::from("/m/film.mkv")
        );
    }

    #[test]
    fn test_replacement_target_rewraps_avi() {
        assert_eq!(
            replacement_target(Path::new("/m/film.avi")),
            PathBuf::from("/m/film.mkv")
        );
    }

    #[test]
    fn test_encoded_sibling_path() {
        assert_eq!(
            encoded_sibling_path(Path::new("/m/film.mkv")),
            PathBuf::from("/m/film-encoded.mkv")
        );
        // Rewrapped containers derive the new extension too.
        assert_eq!(
            encoded_sibling_path(Path::new("/m/film.mp4")),
            PathBuf::from("/m/film-encoded.mkv")
        );
        // Dots in the stem survive.
        assert_eq!(
            encoded_sibling_path(Path::new("/m/film.2024.mkv")),
            PathBuf::from("/m/film.2024-encoded.mkv")
        );
    }

    #[test]
    fn test_in_place_replacement() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("film.mkv");
        let encoded = temp_dir.path().join("film.tmp.mkv");
        write_file(&original, b"original content");
        write_file(&encoded, b"encoded content");

        let landed = apply_replacement(&original, &encoded, &ReplaceMode::InPlace).unwrap();

        assert_eq!(landed, original);
        assert_eq!(fs::read_to_string(&original).unwrap(), "encoded content");
        assert!(!encoded.exists());
    }

    #[test]
    fn test_in_place_rewrap_removes_old_container() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("film.avi");
        let encoded = temp_dir.path().join("film.tmp.mkv");
        write_file(&original, b"original content");
        write_file(&encoded, b"encoded content");

        let landed = apply_replacement(&original, &encoded, &ReplaceMode::InPlace).unwrap();

        assert_eq!(landed, temp_dir.path().join("film.mkv"));
        assert_eq!(fs::read_to_string(&landed).unwrap(), "encoded content");
        assert!(!original.exists());
    }

    #[test]
    fn test_keep_original_mode() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("film.mkv");
        let encoded = temp_dir.path().join("film.tmp.mkv");
        write_file(&original, b"original content");
        write_file(&encoded, b"encoded content");

        let landed = apply_replacement(&original, &encoded, &ReplaceMode::KeepOriginal).unwrap();

        // Original untouched, encode beside it under the derived name.
        assert_eq!(fs::read_to_string(&original).unwrap(), "original content");
        assert_eq!(landed, temp_dir.path().join("film-encoded.mkv"));
        assert_eq!(fs::read_to_string(&landed).unwrap(), "encoded content");
    }

    #[test]
    fn test_backup_mode() {
        let temp_dir = TempDir::new().unwrap();
        let backup_dir = temp_dir.path().join("backups");
        let original = temp_dir.path().join("film.mkv");
        let encoded = temp_dir.path().join("film.tmp.mkv");
        write_file(&original, b"original content");
        write_file(&encoded, b"encoded content");

        let landed = apply_replacement(
            &original,
            &encoded,
            &ReplaceMode::Backup(backup_dir.clone()),
        )
        .unwrap();

        assert_eq!(landed, original);
        assert_eq!(fs::read_to_string(&original).unwrap(), "encoded content");
        assert_eq!(
            fs::read_to_string(backup_dir.join("film.mkv")).unwrap(),
            "original content"
        );
    }

    #[test]
    fn test_backup_failure_preserves_both_files() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("missing.mkv");
        let encoded = temp_dir.path().join("film.tmp.mkv");
        write_file(&encoded, b"encoded content");

        // Backing up a nonexistent original fails before anything moves.
        let result = apply_replacement(
            &original,
            &encoded,
            &ReplaceMode::Backup(temp_dir.path().join("backups")),
        );

        assert!(matches!(result, Err(ReplaceError::BackupFailed(_))));
        assert!(encoded.exists());
    }
}
