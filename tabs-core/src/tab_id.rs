use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Catalog identifier of a single tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl TabId {
    /// Accepts a bare number or a catalog URL ending in `-<id>`, such as
    /// `https://tabs.example.com/tab/artist/song-chords-123456`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let tail = uri.trim_end_matches('/').rsplit('/').next()?;
        let digits = tail.rsplit('-').next()?;
        digits.parse().ok()
    }

    /// File name used by the disk store.
    pub fn to_file_name(self) -> String {
        format!("{}.json", self.0)
    }
}

impl FromStr for TabId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for TabId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbers() {
        assert_eq!("42".parse::<TabId>().unwrap(), TabId(42));
        assert_eq!(" 7 ".parse::<TabId>().unwrap(), TabId(7));
        assert!("abc".parse::<TabId>().is_err());
        assert!("-1".parse::<TabId>().is_err());
    }

    #[test]
    fn parses_catalog_urls() {
        assert_eq!(
            TabId::from_uri("https://tabs.example.com/tab/artist/song-chords-123456"),
            Some(TabId(123456))
        );
        assert_eq!(TabId::from_uri("998/"), Some(TabId(998)));
        assert_eq!(TabId::from_uri("https://tabs.example.com/tab/artist/song"), None);
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_string(&TabId(10)).unwrap(), "10");
        let id: TabId = serde_json::from_str("11").unwrap();
        assert_eq!(id, TabId(11));
    }
}
