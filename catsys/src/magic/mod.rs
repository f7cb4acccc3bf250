use crate::{archive, scheme::kifint::KifintArchive};
use enum_iterator::IntoEnumIterator;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoEnumIterator)]
pub enum Archive {
    Kifint,
    NotRecognized,
}

impl Archive {
    /// Parse first few bytes of file to detect archive type
    pub fn parse(buf: &[u8]) -> Self {
        match buf {
            // KIF\x00
            [0x4B, 0x49, 0x46, 0x00, ..] => Self::Kifint,
            _ => Self::NotRecognized,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kifint => "KIFINT",
            Self::NotRecognized => "unknown",
        }
    }

    /// Names of all recognized archive types
    pub fn names() -> Vec<&'static str> {
        Archive::into_enum_iter()
            .filter(|a| *a != Self::NotRecognized)
            .map(|a| a.name())
            .collect()
    }

    pub fn open(
        &self,
        path: &Path,
        vcode2: &str,
    ) -> anyhow::Result<Box<dyn archive::Archive>> {
        match self {
            Self::Kifint => Ok(Box::new(KifintArchive::open(path, vcode2)?)),
            Self::NotRecognized => {
                Err(crate::error::CatError::Unrecognized(path.to_path_buf()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Archive::parse(b"KIF\0\x02\0\0\0"), Archive::Kifint);
        assert_eq!(Archive::parse(b"KIF"), Archive::NotRecognized);
        assert_eq!(Archive::parse(b"PK\x03\x04"), Archive::NotRecognized);
        assert_eq!(Archive::names(), vec!["KIFINT"]);
    }

    #[test]
    fn test_open_unrecognized() {
        let err = Archive::NotRecognized
            .open(Path::new("a.zip"), "")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::CatError>(),
            Some(crate::error::CatError::Unrecognized(_))
        ));
    }
}
