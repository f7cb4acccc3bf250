use super::{kind, KifintArchive, KifintType};
use crate::archive::{Archive, FileEntry};
use anyhow::Context;
use bytes::Bytes;
use std::{collections::HashMap, path::Path};

/// Entries of several archives addressed by file name.
///
/// The first archive holding a name wins. Entries of the attached update
/// lookup take precedence over all of them.
#[derive(Debug)]
pub struct KifintLookup {
    archive_type: KifintType,
    archives: Vec<KifintArchive>,
    names: HashMap<String, (usize, usize)>,
    update: Option<Box<KifintLookup>>,
}

impl KifintLookup {
    pub fn new(archive_type: KifintType) -> Self {
        Self {
            archive_type,
            archives: Vec::new(),
            names: HashMap::new(),
            update: None,
        }
    }

    /// Load every archive of `archive_type` in `install_dir`.
    pub fn load(
        archive_type: KifintType,
        install_dir: &Path,
        vcode2: &str,
    ) -> anyhow::Result<Self> {
        let paths = archive_type.find_archives(install_dir)?;
        Self::load_paths(archive_type, &paths, vcode2)
    }

    /// Load every archive in `install_dir` matching `wildcard`.
    pub fn load_wildcard(
        wildcard: &str,
        install_dir: &Path,
        vcode2: &str,
    ) -> anyhow::Result<Self> {
        let paths = kind::find_archives(install_dir, wildcard)?;
        Self::load_paths(KifintType::Unknown, &paths, vcode2)
    }

    fn load_paths(
        archive_type: KifintType,
        paths: &[impl AsRef<Path>],
        vcode2: &str,
    ) -> anyhow::Result<Self> {
        let mut lookup = Self::new(archive_type);
        for path in paths {
            let path = path.as_ref();
            let archive = KifintArchive::open(path, vcode2)
                .with_context(|| format!("Could not load {:?}", path))?;
            lookup.merge(archive);
        }
        Ok(lookup)
    }

    pub fn archive_type(&self) -> KifintType {
        self.archive_type
    }

    pub fn archives(&self) -> &[KifintArchive] {
        &self.archives
    }

    pub fn merge(&mut self, archive: KifintArchive) {
        let archive_index = self.archives.len();
        for (entry_index, entry) in archive.entries().iter().enumerate() {
            let key = entry.file_name.to_lowercase();
            if let Some((other, _)) = self.names.get(&key) {
                log::debug!(
                    "{} in {} is shadowed by {}",
                    entry.file_name,
                    archive.file_name(),
                    self.archives[*other].file_name()
                );
                continue;
            }
            self.names.insert(key, (archive_index, entry_index));
        }
        self.archives.push(archive);
    }

    pub fn set_update(&mut self, update: KifintLookup) {
        self.update = Some(Box::new(update));
    }

    pub fn update(&self) -> Option<&KifintLookup> {
        self.update.as_deref()
    }

    /// Entry for `file_name` together with the archive holding it.
    pub fn get(&self, file_name: &str) -> Option<(&KifintArchive, &FileEntry)> {
        if let Some(found) = self.update.as_ref().and_then(|u| u.get(file_name)) {
            return Some(found);
        }
        let (archive, entry) = self.names.get(&file_name.to_lowercase())?;
        let archive = &self.archives[*archive];
        Some((archive, &archive.entries()[*entry]))
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.get(file_name).is_some()
    }

    pub fn extract(&self, file_name: &str) -> anyhow::Result<Bytes> {
        let (archive, entry) = self
            .get(file_name)
            .with_context(|| format!("File not found: {}", file_name))?;
        archive.extract(entry)
    }

    /// Visible entries, update entries replacing the ones they shadow.
    pub fn entries(&self) -> Vec<(&KifintArchive, &FileEntry)> {
        let mut ret = self
            .names
            .iter()
            .filter(|(name, _)| {
                !self.update.as_ref().map_or(false, |u| u.contains(name))
            })
            .map(|(_, (archive, entry))| {
                let archive = &self.archives[*archive];
                (archive, &archive.entries()[*entry])
            })
            .collect::<Vec<_>>();
        if let Some(update) = &self.update {
            ret.extend(update.entries());
        }
        ret.sort_by(|a, b| a.1.file_name.cmp(&b.1.file_name));
        ret
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::*;
    use super::*;
    use tempfile::TempDir;

    const VCODE2: &str = "LOOKUP";

    fn install_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_archive(
            dir.path(),
            "image.int",
            &build_archive(
                VCODE2,
                Some(10),
                &[("bg01.hg3", &b"base bg01"[..]), ("bg02.hg3", &b"base bg02"[..])],
            ),
        );
        write_archive(
            dir.path(),
            "image2.int",
            &build_archive(
                VCODE2,
                Some(20),
                &[("bg02.hg3", &b"second bg02"[..]), ("bg03.hg3", &b"bg03"[..])],
            ),
        );
        write_archive(
            dir.path(),
            "update01.int",
            &build_archive(VCODE2, Some(30), &[("BG01.hg3", &b"patched"[..])]),
        );
        dir
    }

    #[test]
    fn test_merge_first_wins() {
        let dir = install_dir();
        let lookup =
            KifintLookup::load(KifintType::Image, dir.path(), VCODE2).unwrap();
        assert_eq!(lookup.archives().len(), 2);
        assert_eq!(lookup.len(), 3);
        assert_eq!(&lookup.extract("bg02.hg3").unwrap()[..], b"base bg02");
        assert_eq!(&lookup.extract("BG03.HG3").unwrap()[..], b"bg03");
        assert!(lookup.extract("missing.hg3").is_err());
    }

    #[test]
    fn test_update_overrides() {
        let dir = install_dir();
        let mut lookup =
            KifintLookup::load(KifintType::Image, dir.path(), VCODE2).unwrap();
        let update =
            KifintLookup::load(KifintType::Update, dir.path(), VCODE2).unwrap();
        lookup.set_update(update);

        assert_eq!(&lookup.extract("bg01.hg3").unwrap()[..], b"patched");
        let names = lookup
            .entries()
            .iter()
            .map(|(_, e)| e.file_name.clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["BG01.hg3", "bg02.hg3", "bg03.hg3"]);
    }

    #[test]
    fn test_load_wildcard() {
        let dir = install_dir();
        let lookup = KifintLookup::load_wildcard("*.int", dir.path(), VCODE2).unwrap();
        assert_eq!(lookup.archives().len(), 3);
        assert_eq!(lookup.archive_type(), KifintType::Unknown);
        assert!(lookup.contains("bg03.hg3"));
    }

    #[test]
    fn test_len_counts_update_entries() {
        let dir = install_dir();
        let mut lookup = KifintLookup::new(KifintType::Image);
        assert!(lookup.is_empty());
        lookup.set_update(
            KifintLookup::load(KifintType::Update, dir.path(), VCODE2).unwrap(),
        );
        assert_eq!(lookup.len(), 1);
        assert!(!lookup.is_empty());
    }
}
