//! Unit tests for the artifact naming contract
//!
//! External tooling parses these names, so the format is pinned here.

use chrono::NaiveDate;
use rstest::rstest;
use test_utils::ArtifactName;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[rstest]
#[case("erp", date(2025, 3, 4), false, "erp_20250304.sql")]
#[case("erp", date(2025, 3, 4), true, "erp_20250304.sql.gz")]
#[case("erp", date(2025, 1, 1), false, "erp_20250101_annual.sql")]
#[case("my_shop", date(2024, 1, 1), true, "my_shop_20240101_annual.sql.gz")]
fn test_artifact_file_names(
    #[case] db: &str,
    #[case] day: NaiveDate,
    #[case] compressed: bool,
    #[case] expected: &str,
) {
    assert_eq!(ArtifactName::for_run(db, day, compressed).file_name(), expected);
}

#[test]
fn test_parse_underscored_database_name() {
    let name = ArtifactName::parse("my_shop_20240101_annual.sql.gz").unwrap();
    assert_eq!(name.database, "my_shop");
    assert_eq!(name.date, date(2024, 1, 1));
    assert!(name.annual);
    assert!(name.compressed);
}

#[rstest]
#[case("erp.sql")]
#[case("erp_2025034.sql")]
#[case("erp_20251340.sql")]
#[case("_20250304.sql")]
#[case("erp_20250304.bak")]
#[case(".backup-stats.json")]
fn test_parse_rejects_foreign_names(#[case] file: &str) {
    assert!(ArtifactName::parse(file).is_none());
}
