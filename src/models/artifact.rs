//! Artifact naming contract
//!
//! Files are named `{database}_{YYYYMMDD}[_annual].sql[.gz]`. External tooling
//! relies on this layout, so parsing and formatting live side by side here.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

const ANNUAL_SUFFIX: &str = "_annual";
const SQL_EXT: &str = ".sql";
const GZ_EXT: &str = ".gz";

/// Parsed artifact file name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactName {
    pub database: String,
    pub date: NaiveDate,
    pub annual: bool,
    pub compressed: bool,
}

impl ArtifactName {
    /// Name for an artifact produced on `date`; January 1 artifacts are annual
    pub fn for_run(database: &str, date: NaiveDate, compressed: bool) -> Self {
        Self {
            database: database.to_string(),
            date,
            annual: is_annual_date(date),
            compressed,
        }
    }

    /// Parse a file name; `None` if it does not follow the contract
    pub fn parse(file_name: &str) -> Option<Self> {
        let (rest, compressed) = match file_name.strip_suffix(GZ_EXT) {
            Some(rest) => (rest, true),
            None => (file_name, false),
        };
        let rest = rest.strip_suffix(SQL_EXT)?;

        let (rest, annual) = match rest.strip_suffix(ANNUAL_SUFFIX) {
            Some(rest) => (rest, true),
            None => (rest, false),
        };

        let (database, stamp) = rest.rsplit_once('_')?;
        if database.is_empty() || stamp.len() != 8 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let date = NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()?;

        Some(Self {
            database: database.to_string(),
            date,
            annual,
            compressed,
        })
    }

    /// Same artifact with the compression flag set
    pub fn compressed(&self) -> Self {
        Self {
            compressed: true,
            ..self.clone()
        }
    }

    /// Uncompressed counterpart
    pub fn uncompressed(&self) -> Self {
        Self {
            compressed: false,
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.database, self.date.format("%Y%m%d"))?;
        if self.annual {
            f.write_str(ANNUAL_SUFFIX)?;
        }
        f.write_str(SQL_EXT)?;
        if self.compressed {
            f.write_str(GZ_EXT)?;
        }
        Ok(())
    }
}

/// True for January 1 of any year
pub fn is_annual_date(date: NaiveDate) -> bool {
    date.month() == 1 && date.day() == 1
}

/// A backup file found in the artifact directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    /// Creation date: from the name when it follows the contract, otherwise the mtime
    pub date: NaiveDate,
    /// Parsed name, `None` for legacy files
    pub name: Option<ArtifactName>,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Subject to indefinite retention; keyed on the creation date, not the suffix
    pub fn is_annual(&self) -> bool {
        is_annual_date(self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format_plain_and_compressed() {
        let name = ArtifactName::for_run("erp", date(2025, 3, 7), false);
        assert_eq!(name.file_name(), "erp_20250307.sql");
        assert_eq!(name.compressed().file_name(), "erp_20250307.sql.gz");
    }

    #[test]
    fn test_january_first_is_annual() {
        let name = ArtifactName::for_run("erp", date(2024, 1, 1), true);
        assert!(name.annual);
        assert_eq!(name.file_name(), "erp_20240101_annual.sql.gz");
    }

    #[rstest]
    #[case("erp_20250307.sql", "erp", false, false)]
    #[case("erp_20240101_annual.sql.gz", "erp", true, true)]
    #[case("my_shop_db_20251231.sql.gz", "my_shop_db", false, true)]
    fn test_parse(
        #[case] file: &str,
        #[case] database: &str,
        #[case] annual: bool,
        #[case] compressed: bool,
    ) {
        let name = ArtifactName::parse(file).unwrap();
        assert_eq!(name.database, database);
        assert_eq!(name.annual, annual);
        assert_eq!(name.compressed, compressed);
        assert_eq!(name.file_name(), file);
    }

    #[rstest]
    #[case("erp_2025037.sql")]
    #[case("erp_20251340.sql")]
    #[case("_20250307.sql")]
    #[case("erp_20250307.bak")]
    #[case("notes.txt")]
    fn test_parse_rejects(#[case] file: &str) {
        assert!(ArtifactName::parse(file).is_none());
    }

    #[test]
    fn test_annual_suffix_alone_does_not_exempt() {
        let name = ArtifactName::parse("erp_20250307_annual.sql").unwrap();
        let artifact = Artifact {
            path: PathBuf::from("/backups/erp_20250307_annual.sql"),
            date: name.date,
            name: Some(name),
            size_bytes: 10,
        };
        assert!(!artifact.is_annual());

        let artifact = Artifact {
            path: PathBuf::from("/backups/erp_20250101.sql"),
            date: date(2025, 1, 1),
            name: ArtifactName::parse("erp_20250101.sql"),
            size_bytes: 10,
        };
        assert!(artifact.is_annual());
    }
}
