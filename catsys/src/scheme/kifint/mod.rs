//! KIFINT (`*.int`) archives.
//!
//! The table of contents holds fixed 72 byte records. Encrypted archives
//! carry an extra `__key__.dat` record whose length seeds the Blowfish key;
//! every other record then has an obfuscated name and an encrypted
//! offset/length pair.

pub mod decrypt;
pub mod kind;
pub mod lookup;
pub mod stream;

use crate::{
    archive::{Archive, FileEntry},
    crypto::{self, KifCipher},
    error::CatError,
    util,
};
use anyhow::Context;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use positioned_io::{RandomAccessFile, ReadAt};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use scroll::{Pread, Pwrite, LE};
use std::{
    collections::BTreeSet,
    io::Read,
    path::{Path, PathBuf},
};
use stream::EntryReader;

pub use kind::KifintType;
pub use lookup::KifintLookup;

pub const KIF_SIGNATURE: &str = "KIF";
pub const KEY_FILE_NAME: &str = "__key__.dat";
pub(crate) const HEADER_SIZE: usize = 8;
pub(crate) const ENTRY_SIZE: usize = 72;
/// Encrypted entries at least this large are read through a stream.
pub const STREAM_THRESHOLD: u64 = 256 * 1024;

#[derive(Debug, Pread, Pwrite, Copy, Clone)]
pub(crate) struct KifHeader {
    pub(crate) signature: [u8; 4],
    pub(crate) entry_count: i32,
}

#[derive(Debug, Pread, Pwrite, Copy, Clone)]
pub(crate) struct KifEntryRaw {
    pub(crate) file_name: [u8; 64],
    pub(crate) offset: u32,
    pub(crate) length: i32,
}

impl KifEntryRaw {
    fn name_bytes(&self) -> &[u8] {
        let end = self
            .file_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.file_name.len());
        &self.file_name[..end]
    }
    pub(crate) fn is_key(&self) -> bool {
        self.name_bytes() == KEY_FILE_NAME.as_bytes()
    }
    pub(crate) fn to_file_entry(&self, index: usize) -> FileEntry {
        FileEntry {
            file_name: util::decode_sjis(&self.file_name),
            file_offset: self.offset as u64,
            // Negative lengths end up out of range and are rejected on
            // extraction.
            file_size: self.length as u32 as u64,
            index,
        }
    }
}

/// The table of contents exactly as stored.
#[derive(Debug)]
pub(crate) struct KifIndex {
    pub(crate) header: KifHeader,
    pub(crate) entries: Vec<KifEntryRaw>,
}

/// A table of contents with names and offsets restored.
#[derive(Debug)]
pub(crate) struct DecryptedIndex {
    /// Entries in table order, each with its table index. The key entry is
    /// not included.
    pub(crate) entries: Vec<(usize, KifEntryRaw)>,
    pub(crate) cipher: Option<KifCipher>,
}

pub(crate) fn check_signature(signature: &[u8]) -> anyhow::Result<()> {
    let end = signature
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(signature.len());
    if &signature[..end] != KIF_SIGNATURE.as_bytes() {
        return Err(CatError::InvalidFormat {
            expected: KIF_SIGNATURE,
            found: signature.to_vec(),
        }
        .into());
    }
    Ok(())
}

impl KifIndex {
    pub(crate) fn read<R: ReadAt>(
        file: &R,
        file_len: u64,
    ) -> anyhow::Result<Self> {
        let mut buf = vec![0; HEADER_SIZE];
        if file_len < 4 {
            file.read_exact_at(0, &mut buf[..file_len as usize])?;
            return Err(CatError::InvalidFormat {
                expected: KIF_SIGNATURE,
                found: buf[..file_len as usize].to_vec(),
            }
            .into());
        }
        file.read_exact_at(0, &mut buf[..4])?;
        check_signature(&buf[..4])?;
        if file_len < HEADER_SIZE as u64 {
            return Err(CatError::CorruptArchive(String::from(
                "Truncated header",
            ))
            .into());
        }
        file.read_exact_at(0, &mut buf)?;
        let header = buf.pread_with::<KifHeader>(0, LE)?;
        log::debug!("Header: {:?}", header);

        if header.entry_count < 0 {
            return Err(CatError::CorruptArchive(format!(
                "Negative entry count: {}",
                header.entry_count
            ))
            .into());
        }
        let table_len = header.entry_count as u64 * ENTRY_SIZE as u64;
        if HEADER_SIZE as u64 + table_len > file_len {
            return Err(CatError::CorruptArchive(format!(
                "Entry table of {} entries exceeds file size {}",
                header.entry_count, file_len
            ))
            .into());
        }
        let mut buf = util::alloc_zeroed(table_len as usize)?;
        file.read_exact_at(HEADER_SIZE as u64, &mut buf)?;
        let off = &mut 0;
        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            entries.push(buf.gread_with::<KifEntryRaw>(off, LE)?);
        }
        Ok(Self { header, entries })
    }

    pub(crate) fn key_index(&self) -> Option<usize> {
        self.entries.iter().position(KifEntryRaw::is_key)
    }

    pub(crate) fn decrypt(&self, vcode2: &str) -> anyhow::Result<DecryptedIndex> {
        let key_index = match self.key_index() {
            Some(key_index) => key_index,
            None => {
                log::debug!("No key entry, archive is not encrypted");
                return Ok(DecryptedIndex {
                    entries: self.entries.iter().copied().enumerate().collect(),
                    cipher: None,
                });
            }
        };
        let key_length = self.entries[key_index].length as u32;
        let cipher = KifCipher::new(crypto::file_key(key_length))?;
        let toc_seed = crypto::toc_seed(vcode2);
        log::debug!("TOC seed: {:#010X}, cipher: {:?}", toc_seed, cipher);

        let entries = self
            .entries
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_index)
            .map(|(i, raw)| {
                let mut entry = *raw;
                crypto::deobfuscate_name(
                    &mut entry.file_name,
                    toc_seed.wrapping_add(i as u32),
                );
                let (offset, length) = cipher.decrypt_pair(
                    entry.offset.wrapping_add(i as u32),
                    entry.length as u32,
                );
                entry.offset = offset;
                entry.length = length as i32;
                (i, entry)
            })
            .collect();
        Ok(DecryptedIndex {
            entries,
            cipher: Some(cipher),
        })
    }
}

#[derive(Debug)]
pub struct KifintArchive {
    path: PathBuf,
    file: RandomAccessFile,
    file_len: u64,
    entries: Vec<FileEntry>,
    file_key: Option<u32>,
    cipher: OnceCell<KifCipher>,
}

impl KifintArchive {
    /// Open an archive and restore its table of contents with `vcode2`.
    pub fn open(path: &Path, vcode2: &str) -> anyhow::Result<Self> {
        let file = RandomAccessFile::open(path)
            .with_context(|| format!("Could not open {:?}", path))?;
        let file_len = std::fs::metadata(path)?.len();
        let index = KifIndex::read(&file, file_len)
            .with_context(|| format!("Could not read index of {:?}", path))?;
        let decrypted = index.decrypt(vcode2)?;

        let entries = decrypted
            .entries
            .iter()
            .map(|(i, entry)| entry.to_file_entry(*i))
            .collect::<Vec<_>>();
        log::debug!("{:?}: {} entries", path, entries.len());

        let cipher = OnceCell::new();
        let file_key = decrypted.cipher.map(|c| {
            let key = c.key();
            let _ = cipher.set(c);
            key
        });
        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_len,
            entries,
            file_key,
            cipher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_encrypted(&self) -> bool {
        self.file_key.is_some()
    }

    pub fn file_key(&self) -> Option<u32> {
        self.file_key
    }

    pub fn find(&self, file_name: &str) -> Option<&FileEntry> {
        self.entries
            .iter()
            .find(|e| e.file_name.eq_ignore_ascii_case(file_name))
    }

    fn cipher(&self) -> anyhow::Result<Option<&KifCipher>> {
        match self.file_key {
            Some(key) => Ok(Some(
                self.cipher.get_or_try_init(|| KifCipher::new(key))?,
            )),
            None => Ok(None),
        }
    }

    fn check_range(&self, entry: &FileEntry) -> anyhow::Result<()> {
        match entry.file_offset.checked_add(entry.file_size) {
            Some(end) if end <= self.file_len => Ok(()),
            _ => Err(CatError::CorruptArchive(format!(
                "{} at {:#X}+{:#X} is outside of {:?} ({} bytes)",
                entry.file_name,
                entry.file_offset,
                entry.file_size,
                self.path,
                self.file_len
            ))
            .into()),
        }
    }

    /// Open a reader over the stored file. Small encrypted entries are
    /// decrypted in memory, larger ones while reading.
    pub fn open_entry(&self, entry: &FileEntry) -> anyhow::Result<EntryReader<'_>> {
        self.check_range(entry)?;
        let cipher = self.cipher()?;
        if cipher.is_some() && entry.file_size < STREAM_THRESHOLD {
            let mut buf = util::alloc_zeroed(entry.file_size as usize)?;
            self.file.read_exact_at(entry.file_offset, &mut buf)?;
            if let Some(cipher) = cipher {
                cipher.decrypt(&mut buf);
            }
            Ok(EntryReader::memory(Bytes::from(buf)))
        } else {
            Ok(EntryReader::stream(
                &self.file,
                cipher,
                entry.file_offset,
                entry.file_size,
            ))
        }
    }

    /// Set of extensions of the stored files.
    pub fn file_types(&self) -> BTreeSet<String> {
        self.entries.iter().map(FileEntry::extension).collect()
    }
}

impl Archive for KifintArchive {
    fn entries(&self) -> &[FileEntry] {
        &self.entries
    }
    fn extract(&self, entry: &FileEntry) -> anyhow::Result<Bytes> {
        match self.open_entry(entry)? {
            EntryReader::Memory(cursor) => Ok(cursor.into_inner()),
            mut reader => {
                let mut buf = util::alloc_buffer(entry.file_size as usize)?;
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
    fn extract_all(&self, output_path: &Path) -> anyhow::Result<()> {
        self.entries
            .par_iter()
            .try_for_each(|entry| self.write_entry(entry, output_path).map(|_| ()))
    }
}

/// Extensions of the files stored in an archive.
pub fn identify_file_types(
    path: &Path,
    vcode2: &str,
) -> anyhow::Result<BTreeSet<String>> {
    Ok(KifintArchive::open(path, vcode2)?.file_types())
}

/// Whether the archive carries a key entry and so needs `V_CODE2` to read.
pub fn is_encrypted_archive(path: &Path) -> anyhow::Result<bool> {
    let file = RandomAccessFile::open(path)
        .with_context(|| format!("Could not open {:?}", path))?;
    let file_len = std::fs::metadata(path)?.len();
    Ok(KifIndex::read(&file, file_len)?.key_index().is_some())
}
