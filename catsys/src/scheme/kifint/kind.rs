use enum_iterator::IntoEnumIterator;
use glob::{MatchOptions, Pattern};
use itertools::Itertools;
use std::path::{Path, PathBuf};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Archive categories shipped with the engine, recognized by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoEnumIterator)]
pub enum KifintType {
    Bgm,
    Config,
    Export,
    Fes,
    Font,
    Hse,
    Image,
    Js,
    Kcs,
    Kxs,
    Mot,
    Movie,
    Pcm,
    PcmTag,
    Ptcl,
    Ptclpi,
    Scene,
    Se,
    Shd,
    Texture,
    Wp,
    Update,
    Unknown,
}

impl KifintType {
    pub fn wildcards(&self) -> &'static [&'static str] {
        match self {
            Self::Bgm => &["bgm*.int"],
            Self::Config => &["config.int"],
            Self::Export => &["export.int"],
            Self::Fes => &["fes.int"],
            Self::Font => &["font.int"],
            Self::Hse => &["hse*.int"],
            Self::Image => &["image*.int"],
            Self::Js => &["js.int"],
            Self::Kcs => &["kcs.int"],
            Self::Kxs => &["kx2.int", "kx3.int", "kxs.int"],
            Self::Mot => &["mot.int"],
            Self::Movie => &["movie*.int"],
            Self::Pcm => &["pcm_?.int"],
            Self::PcmTag => &["pcm_tag.int"],
            Self::Ptcl => &["ptcl.int"],
            Self::Ptclpi => &["ptclpi.int"],
            Self::Scene => &["scene*.int"],
            Self::Se => &["se*.int"],
            Self::Shd => &["shd.int"],
            Self::Texture => &["texture.int"],
            Self::Wp => &["wp.int"],
            Self::Update => &["update*.int"],
            Self::Unknown => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bgm => "bgm",
            Self::Config => "config",
            Self::Export => "export",
            Self::Fes => "fes",
            Self::Font => "font",
            Self::Hse => "hse",
            Self::Image => "image",
            Self::Js => "js",
            Self::Kcs => "kcs",
            Self::Kxs => "kxs",
            Self::Mot => "mot",
            Self::Movie => "movie",
            Self::Pcm => "pcm",
            Self::PcmTag => "pcm_tag",
            Self::Ptcl => "ptcl",
            Self::Ptclpi => "ptclpi",
            Self::Scene => "scene",
            Self::Se => "se",
            Self::Shd => "shd",
            Self::Texture => "texture",
            Self::Wp => "wp",
            Self::Update => "update",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::into_enum_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.wildcards()
            .iter()
            .filter_map(|w| Pattern::new(w).ok())
            .any(|p| p.matches_with(file_name, MATCH_OPTIONS))
    }

    /// Classify an archive by its file name.
    pub fn from_file_name(file_name: &str) -> Self {
        Self::into_enum_iter()
            .find(|t| t.matches(file_name))
            .unwrap_or(Self::Unknown)
    }

    /// Archives of this type in `dir`, sorted by name.
    pub fn find_archives(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        Ok(self
            .wildcards()
            .iter()
            .map(|w| find_archives(dir, w))
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .sorted()
            .dedup()
            .collect())
    }
}

impl std::str::FromStr for KifintType {
    type Err = crate::error::CatError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            crate::error::CatError::Custom(format!(
                "Unknown archive type: {}. Expected one of: {}",
                s,
                Self::into_enum_iter().map(|t| t.name()).join(", ")
            ))
        })
    }
}

/// Files in `dir` whose name matches `wildcard`, sorted by name.
pub fn find_archives(dir: &Path, wildcard: &str) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = Pattern::new(wildcard)?;
    let mut ret = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matched = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| pattern.matches_with(name, MATCH_OPTIONS));
        if matched && path.is_file() {
            ret.push(path);
        }
    }
    ret.sort();
    Ok(ret)
}
