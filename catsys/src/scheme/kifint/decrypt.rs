//! Rewriting archives on disk without encryption.
//!
//! The encrypted original is moved to `intbackup/` next to the archive
//! before the plain copy is written in its place.

use super::{kind, KifEntryRaw, KifHeader, KifIndex, DecryptedIndex, ENTRY_SIZE, HEADER_SIZE};
use crate::{error::CatError, util};
use anyhow::Context;
use positioned_io::{RandomAccessFile, ReadAt};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use scroll::{Pwrite, LE};
use std::{
    fs::{self, File},
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

pub const BACKUP_DIR: &str = "intbackup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    Decrypted,
    /// An interrupted run was redone from the backup.
    Resumed,
    /// The archive has no key entry.
    AlreadyDecrypted,
}

pub fn backup_path(kifint_path: &Path) -> anyhow::Result<PathBuf> {
    let file_name = kifint_path
        .file_name()
        .with_context(|| format!("No file name in {:?}", kifint_path))?;
    let dir = kifint_path.parent().unwrap_or_else(|| Path::new(""));
    Ok(dir.join(BACKUP_DIR).join(file_name))
}

/// Replace an archive with a decrypted copy, keeping the original as a
/// backup.
pub fn decrypt_archive(path: &Path, vcode2: &str) -> anyhow::Result<DecryptOutcome> {
    let backup = backup_path(path)?;
    let file = RandomAccessFile::open(path)
        .with_context(|| format!("Could not open {:?}", path))?;
    let file_len = fs::metadata(path)?.len();

    let index = match KifIndex::read(&file, file_len) {
        Ok(index) => index,
        Err(err) => {
            let bad_signature = matches!(
                err.downcast_ref::<CatError>(),
                Some(CatError::InvalidFormat { .. })
            );
            if bad_signature && backup.is_file() {
                log::warn!(
                    "{:?} is not a KIFINT archive, restarting from {:?}",
                    path,
                    backup
                );
                drop(file);
                decrypt_from(&backup, path, vcode2)?;
                return Ok(DecryptOutcome::Resumed);
            }
            return Err(err);
        }
    };
    if index.key_index().is_none() {
        log::debug!("{:?} is already decrypted", path);
        return Ok(DecryptOutcome::AlreadyDecrypted);
    }
    drop(file);

    fs::create_dir_all(backup.parent().context("Backup has no parent")?)?;
    if backup.exists() {
        fs::remove_file(&backup)?;
    }
    fs::rename(path, &backup)
        .with_context(|| format!("Could not move {:?} to {:?}", path, backup))?;
    decrypt_from(&backup, path, vcode2)?;
    Ok(DecryptOutcome::Decrypted)
}

fn decrypt_from(source: &Path, dest: &Path, vcode2: &str) -> anyhow::Result<()> {
    let input = RandomAccessFile::open(source)?;
    let input_len = fs::metadata(source)?.len();
    let index = KifIndex::read(&input, input_len)?;
    let decrypted = index.decrypt(vcode2)?;
    let output = File::create(dest)
        .with_context(|| format!("Could not create {:?}", dest))?;
    write_decrypted(&index, &decrypted, &input, input_len, BufWriter::new(output))
}

fn write_decrypted<R: ReadAt, W: Write + Seek>(
    index: &KifIndex,
    decrypted: &DecryptedIndex,
    input: &R,
    input_len: u64,
    mut output: W,
) -> anyhow::Result<()> {
    for (i, entry) in decrypted.entries.iter() {
        let offset = entry.offset as u64;
        let length = entry.length as u32 as u64;
        if offset + length > input_len {
            return Err(CatError::CorruptArchive(format!(
                "Entry {} at {:#X}+{:#X} exceeds archive size {}",
                i, offset, length, input_len
            ))
            .into());
        }
        let mut buf = util::alloc_zeroed(length as usize)?;
        input.read_exact_at(offset, &mut buf)?;
        if let Some(cipher) = &decrypted.cipher {
            cipher.decrypt(&mut buf);
        }
        output.seek(SeekFrom::Start(offset))?;
        output.write_all(&buf)?;
    }

    let entries = decrypted
        .entries
        .iter()
        .map(|(_, entry)| *entry)
        .collect::<Vec<KifEntryRaw>>();
    let header = KifHeader {
        signature: index.header.signature,
        entry_count: entries.len() as i32,
    };
    let mut table = vec![0; HEADER_SIZE + entries.len() * ENTRY_SIZE];
    let off = &mut 0;
    table.gwrite_with(header, off, LE)?;
    for entry in entries {
        table.gwrite_with(entry, off, LE)?;
    }
    output.seek(SeekFrom::Start(0))?;
    output.write_all(&table)?;
    output.flush()?;
    Ok(())
}

/// Decrypt every archive in `install_dir` matching `wildcard`. A failure
/// does not stop the remaining archives.
pub fn decrypt_archives(
    install_dir: &Path,
    wildcard: &str,
    vcode2: &str,
) -> anyhow::Result<Vec<(PathBuf, anyhow::Result<DecryptOutcome>)>> {
    let paths = kind::find_archives(install_dir, wildcard)?;
    Ok(paths
        .into_par_iter()
        .map(|path| {
            let result = decrypt_archive(&path, vcode2);
            if let Err(err) = &result {
                log::error!("{:?}: {:#}", path, err);
            }
            (path, result)
        })
        .collect())
}

/// Move the backup of an archive back in place.
pub fn restore_archive(path: &Path) -> anyhow::Result<bool> {
    let backup = backup_path(path)?;
    if !backup.is_file() {
        return Ok(false);
    }
    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&backup, path)
        .with_context(|| format!("Could not move {:?} to {:?}", backup, path))?;
    Ok(true)
}

/// Restore every backed up archive matching `wildcard`, whether or not the
/// live archive is still there.
pub fn restore_archives(
    install_dir: &Path,
    wildcard: &str,
) -> anyhow::Result<Vec<PathBuf>> {
    let backup_dir = install_dir.join(BACKUP_DIR);
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut restored = Vec::new();
    for backup in kind::find_archives(&backup_dir, wildcard)? {
        let path = install_dir.join(backup.file_name().context("No file name")?);
        if restore_archive(&path)? {
            restored.push(path);
        }
    }
    Ok(restored)
}
