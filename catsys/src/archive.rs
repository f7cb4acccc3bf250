use crate::error::CatError;
use anyhow::Context;
use bytes::Bytes;
use std::{
    fmt::Debug,
    fs::File,
    io::Write,
    path::{Component, Path, PathBuf},
};

pub trait Archive: Sync + Send + Debug {
    fn entries(&self) -> &[FileEntry];
    fn extract(&self, entry: &FileEntry) -> anyhow::Result<Bytes>;
    fn extract_all(&self, output_path: &Path) -> anyhow::Result<()>;
    /// Extract a single entry below `output_path`, returning the written
    /// file.
    fn write_entry(&self, entry: &FileEntry, output_path: &Path) -> anyhow::Result<PathBuf> {
        entry.write(&self.extract(entry)?, output_path)
    }
}

/// A decrypted entry of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_name: String,
    pub file_offset: u64,
    pub file_size: u64,
    /// Position of the entry in its archive's table, key entry included.
    pub index: usize,
}

impl FileEntry {
    /// Lower-cased extension including the dot, empty when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default()
    }

    /// Where the entry lands below `output_path`. Only plain name
    /// components are kept, so stored names can not leave the directory.
    pub fn output_path(&self, output_path: &Path) -> anyhow::Result<PathBuf> {
        let name = self.file_name.replace('\\', "/");
        let relative = Path::new(&name)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect::<PathBuf>();
        if relative.as_os_str().is_empty() {
            return Err(CatError::CorruptArchive(format!(
                "Entry {} has no usable file name: {:?}",
                self.index, self.file_name
            ))
            .into());
        }
        Ok(output_path.join(relative))
    }

    /// Write the extracted contents `buf` of this entry below `output_path`.
    pub fn write(&self, buf: &[u8], output_path: &Path) -> anyhow::Result<PathBuf> {
        let output_file_name = self.output_path(output_path)?;
        std::fs::create_dir_all(
            &output_file_name
                .parent()
                .context("Could not get parent directory")?,
        )?;
        log::debug!("Extracting resource: {:?} {:X?}", output_file_name, self);
        File::create(&output_file_name)?.write_all(buf)?;
        Ok(output_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        let mut entry = FileEntry {
            file_name: String::from("BG01.HG3"),
            file_offset: 0,
            file_size: 0,
            index: 0,
        };
        assert_eq!(entry.extension(), ".hg3");
        entry.file_name = String::from("readme");
        assert_eq!(entry.extension(), "");
    }

    #[test]
    fn test_output_path_stays_inside() {
        let out = Path::new("ext");
        let entry = |name: &str| FileEntry {
            file_name: String::from(name),
            file_offset: 0,
            file_size: 0,
            index: 1,
        };
        assert_eq!(
            entry("bg01.hg3").output_path(out).unwrap(),
            PathBuf::from("ext/bg01.hg3")
        );
        assert_eq!(
            entry("../../x.txt").output_path(out).unwrap(),
            PathBuf::from("ext/x.txt")
        );
        assert_eq!(
            entry("/etc/x").output_path(out).unwrap(),
            PathBuf::from("ext/etc/x")
        );
        assert_eq!(
            entry("sub\\..\\a.txt").output_path(out).unwrap(),
            PathBuf::from("ext/sub/a.txt")
        );
        let err = entry("..").output_path(out).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatError>(),
            Some(CatError::CorruptArchive(_))
        ));
    }
}
