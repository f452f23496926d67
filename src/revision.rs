// restoretool/src/revision.rs
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::MySqlConnection;

use crate::errors::Result;

/// Provenance parsed from a dump's logical name. Persisted as the sole row
/// of the `dbrevision` marker table after every restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub branch: String,
    pub revision: String,
    pub masked: bool,
}

// `<tag?><installation>_<n>-<n>[_<branch>][_<revision>]`, e.g.
// `masked_trunk_1-23_feature$branch_1.2.3`. `$` stands in for `/` in branch
// names because the name doubles as a remote file name.
static DUMP_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(test_|masked_)?[a-zA-Z0-9\-]+_[0-9]+-[0-9]+(?:_([a-zA-Z0-9$\-]+))?(?:_([a-f0-9v.]+))?$",
    )
    .expect("dump name pattern is valid")
});

static VERSION_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9v.]").expect("version pattern is valid"));

/// Matches `dump_name` against the provenance pattern. A name that does not
/// match is not an error; it simply carries no revision information.
pub fn parse_dump_name(dump_name: &str) -> Option<RevisionRecord> {
    let captures = DUMP_NAME_PATTERN.captures(dump_name)?;

    let masked = captures.get(1).map(|tag| tag.as_str()) == Some("masked_");
    let branch = captures
        .get(2)
        .map(|branch| branch.as_str())
        .unwrap_or_default()
        .replace('$', "/");
    let revision_token = captures
        .get(3)
        .map(|revision| revision.as_str())
        .unwrap_or_default();
    let revision = if VERSION_LIKE.is_match(revision_token) {
        revision_token.to_string()
    } else {
        "latest".to_string()
    };

    Some(RevisionRecord {
        branch,
        revision,
        masked,
    })
}

/// Drops and recreates the marker table, then inserts one provenance row
/// when the dump name matches the pattern. The table only ever holds the
/// most recent restore's provenance.
pub async fn record_revision(
    conn: &mut MySqlConnection,
    dump_name: &str,
) -> Result<Option<RevisionRecord>> {
    sqlx::query("DROP TABLE IF EXISTS dbrevision")
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "CREATE TABLE dbrevision (branch TEXT, revision VARCHAR(255), masked TINYINT NOT NULL DEFAULT 0)",
    )
    .execute(&mut *conn)
    .await?;

    let Some(record) = parse_dump_name(dump_name) else {
        println!(
            "Dump name '{}' carries no revision information, marker table left empty",
            dump_name
        );
        return Ok(None);
    };

    sqlx::query("INSERT INTO dbrevision VALUES (?, ?, ?)")
        .bind(&record.branch)
        .bind(&record.revision)
        .bind(record.masked as i8)
        .execute(conn)
        .await?;

    println!(
        "✓ Recorded revision: branch '{}', revision '{}', masked {}",
        record.branch, record.revision, record.masked
    );
    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_masked_dump_with_branch_and_revision() {
        let record = parse_dump_name("masked_trunk_1-23_feature$branch_1.2.3").unwrap();
        assert_eq!(
            record,
            RevisionRecord {
                branch: "feature/branch".into(),
                revision: "1.2.3".into(),
                masked: true,
            }
        );
    }

    #[test]
    fn test_parse_non_matching_name_is_none() {
        assert_eq!(parse_dump_name("not-a-matching-name"), None);
        assert_eq!(parse_dump_name(""), None);
    }

    #[test]
    fn test_parse_test_tag_is_not_masked() {
        let record = parse_dump_name("test_trunk_1-23").unwrap();
        assert!(!record.masked);
        assert_eq!(record.branch, "");
        assert_eq!(record.revision, "latest");
    }

    #[test]
    fn test_parse_revision_defaults_to_latest() {
        // Token present but not version-like.
        let record = parse_dump_name("trunk_1-23_feature_abc").unwrap();
        assert_eq!(record.branch, "feature");
        assert_eq!(record.revision, "latest");

        // Token absent entirely.
        let record = parse_dump_name("trunk_1-23_feature").unwrap();
        assert_eq!(record.revision, "latest");
    }

    #[test]
    fn test_parse_plain_dump_with_revision() {
        let record = parse_dump_name("acme-live_4-17_master_2v1").unwrap();
        assert_eq!(record.branch, "master");
        assert_eq!(record.revision, "2v1");
        assert!(!record.masked);
    }
}
