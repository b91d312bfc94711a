//! Archive service: zip packing of save data, plus local save helpers.
//!
//! A directory save is archived as a tree of entries relative to the save
//! directory (empty sub-directories included). A single-file save is archived
//! as one entry named after the file. Entry names always use `/`.
//!
//! Everything here is blocking; the engine calls it through
//! `tokio::task::spawn_blocking`.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::Utc;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{io_err, ArchiveError};

/// Suffix stem of defensive copies made before a first-time sync.
pub const BACKUP_SUFFIX: &str = "sixtyfive-backup";

/// Pack `path` into zip bytes (tree when `is_folder`, one entry otherwise).
pub fn pack(path: &Path, is_folder: bool) -> Result<Vec<u8>, ArchiveError> {
    if !path.exists() {
        return Err(ArchiveError::NothingToPack(path.to_path_buf()));
    }
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    if is_folder {
        for entry in WalkDir::new(path).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(path) else {
                continue;
            };
            let name = entry_name(relative);
            if entry.file_type().is_dir() {
                writer.add_directory(name, options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(name, options)?;
                copy_into(entry.path(), &mut writer)?;
            }
        }
    } else {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        copy_into(path, &mut writer)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Unpack zip bytes into `dest`.
///
/// Tree mode merges into `dest`, overwriting files present in the archive and
/// leaving other files alone. Single-file mode writes the entry named like
/// `dest` (or the archive's only file entry) to `dest`.
pub fn unpack(data: &[u8], dest: &Path, is_folder: bool) -> Result<(), ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    if is_folder {
        unpack_tree(&mut archive, dest)
    } else {
        unpack_entry(&mut archive, dest)
    }
}

fn unpack_tree(archive: &mut ZipArchive<Cursor<&[u8]>>, dest: &Path) -> Result<(), ArchiveError> {
    std::fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(entry = %file.name(), "skipping archive entry outside destination");
            continue;
        };
        let out = dest.join(relative);
        if file.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| io_err(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let mut target = File::create(&out).map_err(|e| io_err(&out, e))?;
        io::copy(&mut file, &mut target).map_err(|e| io_err(&out, e))?;
    }
    Ok(())
}

fn unpack_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, dest: &Path) -> Result<(), ArchiveError> {
    let wanted = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut files = Vec::new();
    for index in 0..archive.len() {
        let file = archive.by_index(index)?;
        if file.is_file() {
            files.push((index, file.name().to_string()));
        }
    }
    let index = match files.iter().find(|(_, name)| *name == wanted) {
        Some((index, _)) => *index,
        None if files.len() == 1 => files[0].0,
        None => return Err(ArchiveError::MissingEntry { entry: wanted }),
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut file = archive.by_index(index)?;
    let mut target = File::create(dest).map_err(|e| io_err(dest, e))?;
    io::copy(&mut file, &mut target).map_err(|e| io_err(dest, e))?;
    Ok(())
}

/// Newest modification time (epoch ms) of the files at or below `path`.
///
/// Directory mtimes are ignored, so a missing path and a tree without files
/// both give `None`.
pub fn latest_modified(path: &Path) -> Option<i64> {
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .filter_map(|time| time.duration_since(UNIX_EPOCH).ok())
        .filter_map(|since| i64::try_from(since.as_millis()).ok())
        .max()
}

/// Copy `path` to a timestamped sibling, e.g.
/// `saves.sixtyfive-backup-20260101T120000123`. Returns the copy's path.
pub fn backup_copy(path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut name: OsString = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(
        ".{BACKUP_SUFFIX}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%3f")
    ));
    let target = path.with_file_name(name);

    if path.is_dir() {
        for entry in WalkDir::new(path) {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(path) else {
                continue;
            };
            let out = target.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&out).map_err(|e| io_err(&out, e))?;
            } else if entry.file_type().is_file() {
                std::fs::copy(entry.path(), &out).map_err(|e| io_err(&out, e))?;
            }
        }
    } else {
        std::fs::copy(path, &target).map_err(|e| io_err(&target, e))?;
    }
    Ok(target)
}

fn copy_into(path: &Path, writer: &mut ZipWriter<Cursor<Vec<u8>>>) -> Result<(), ArchiveError> {
    let mut source = File::open(path).map_err(|e| io_err(path, e))?;
    io::copy(&mut source, writer).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime};

    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = entry_name(e.path().strip_prefix(root).unwrap());
                (rel, std::fs::read(e.path()).unwrap())
            })
            .collect()
    }

    fn save_tree(root: &Path) {
        std::fs::create_dir_all(root.join("slots/auto")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("settings.ini"), b"volume=7\n").unwrap();
        std::fs::write(root.join("slots/slot1.sav"), [0u8, 1, 2, 255]).unwrap();
        std::fs::write(root.join("slots/auto/quick.sav"), b"quick").unwrap();
    }

    #[test]
    fn directory_roundtrip_preserves_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        save_tree(src.path());

        let bytes = pack(src.path(), true).expect("pack");
        let out = dst.path().join("restored");
        unpack(&bytes, &out, true).expect("unpack");

        assert_eq!(snapshot(src.path()), snapshot(&out));
        assert!(out.join("empty").is_dir(), "empty directories survive");
    }

    #[test]
    fn single_file_roundtrip() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("profile.sav");
        std::fs::write(&file, b"level=42").unwrap();

        let bytes = pack(&file, false).expect("pack");
        let out = dst.path().join("nested").join("profile.sav");
        unpack(&bytes, &out, false).expect("unpack");
        assert_eq!(std::fs::read(out).unwrap(), b"level=42");
    }

    #[test]
    fn single_file_unpack_accepts_renamed_destination() {
        let src = TempDir::new().unwrap();
        let file = src.path().join("old-name.sav");
        std::fs::write(&file, b"data").unwrap();
        let bytes = pack(&file, false).expect("pack");

        let out = src.path().join("new-name.sav");
        unpack(&bytes, &out, false).expect("unpack");
        assert_eq!(std::fs::read(out).unwrap(), b"data");
    }

    #[test]
    fn single_file_unpack_without_match_fails() {
        let src = TempDir::new().unwrap();
        save_tree(src.path());
        let bytes = pack(src.path(), true).expect("pack");

        let err = unpack(&bytes, &src.path().join("missing.sav"), false).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry { ref entry } if entry == "missing.sav"));
    }

    #[test]
    fn pack_missing_path_fails() {
        let src = TempDir::new().unwrap();
        let err = pack(&src.path().join("nope"), true).unwrap_err();
        assert!(matches!(err, ArchiveError::NothingToPack(_)));
    }

    #[test]
    fn unpack_garbage_is_zip_error() {
        let dst = TempDir::new().unwrap();
        let err = unpack(b"definitely not a zip", dst.path(), true).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
    }

    #[test]
    fn unpack_tree_overwrites_existing_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        save_tree(src.path());
        std::fs::write(dst.path().join("settings.ini"), b"stale").unwrap();
        std::fs::write(dst.path().join("local-only.txt"), b"keep").unwrap();

        unpack(&pack(src.path(), true).unwrap(), dst.path(), true).expect("unpack");
        assert_eq!(std::fs::read(dst.path().join("settings.ini")).unwrap(), b"volume=7\n");
        assert_eq!(std::fs::read(dst.path().join("local-only.txt")).unwrap(), b"keep");
    }

    #[test]
    fn latest_modified_takes_newest_entry() {
        let root = TempDir::new().unwrap();
        save_tree(root.path());
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        for path in [
            root.path().join("settings.ini"),
            root.path().join("slots/slot1.sav"),
            root.path().join("slots/auto/quick.sav"),
            root.path().join("slots/auto"),
            root.path().join("slots"),
            root.path().join("empty"),
            root.path().to_path_buf(),
        ] {
            set_file_mtime(&path, FileTime::from_system_time(base)).unwrap();
        }
        let newest = base + Duration::from_secs(1);
        set_file_mtime(
            root.path().join("slots/auto/quick.sav"),
            FileTime::from_system_time(newest),
        )
        .unwrap();

        assert_eq!(latest_modified(root.path()), Some(1_001_000));
        assert_eq!(latest_modified(&root.path().join("missing")), None);
    }

    #[test]
    fn latest_modified_ignores_directories() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("empty/nested")).unwrap();
        assert_eq!(latest_modified(root.path()), None);

        let file = root.path().join("empty/slot.sav");
        std::fs::write(&file, b"x").unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        set_file_mtime(&file, FileTime::from_system_time(base)).unwrap();
        assert_eq!(latest_modified(root.path()), Some(5_000));
        assert_eq!(latest_modified(&file), Some(5_000));
    }

    #[test]
    fn backup_copy_duplicates_tree_beside_original() {
        let root = TempDir::new().unwrap();
        let saves = root.path().join("saves");
        save_tree(&saves);

        let copy = backup_copy(&saves).expect("backup");
        assert_eq!(copy.parent(), Some(root.path()));
        assert!(copy
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("saves.sixtyfive-backup-"));
        assert_eq!(snapshot(&saves), snapshot(&copy));
    }

    #[test]
    fn backup_copy_handles_single_file() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("profile.sav");
        std::fs::write(&file, b"mine").unwrap();
        let copy = backup_copy(&file).expect("backup");
        assert_eq!(std::fs::read(copy).unwrap(), b"mine");
    }
}
