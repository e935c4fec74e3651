//! Path templating for downloaded blobs.
//!
//! Converts a [`TransferItem`] into a path below the download root using a
//! user-configured [upon] template (`{{ variable }}`, `{{ value|formatter }}`).
//!
//! # Template Variables
//!
//! | Variable    | Type             | Description                                        |
//! |-------------|------------------|----------------------------------------------------|
//! | `date`      | `String`         | Download date, `YYYY-MM-DD` (UTC)                  |
//! | `account`   | `String`         | Storage account name                               |
//! | `container` | `String`         | Container name                                     |
//! | `name`      | `String`         | Blob name, with a revision stamp before the extension when pinned |
//! | `blob`      | `String`         | Raw blob name                                      |
//! | `revision`  | `Option<String>` | Version id or snapshot timestamp                   |
//!
//! A `truncate(value, n)` function is available for very long blob names.
//!
//! # Example
//!
//! ```
//! use blobrob_engine::{PathGenerator, TransferItem};
//! use std::path::Path;
//! use time::macros::date;
//!
//! let generator: PathGenerator = "{{ date }}/{{ account }}/{{ container }}/{{ name }}".parse().unwrap();
//! let item = TransferItem::new("contoso", "$web", "assets/site.css");
//! let path = generator.generate(&item, date!(2024 - 03 - 01)).unwrap();
//! assert_eq!(path, Path::new("2024-03-01/contoso/$web/assets/site.css"));
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::transfer::TransferItem;
use blobrob_azure::Revision;
use blobrob_storage::validate_path;
use exn::ResultExt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};
use tracing::instrument;
use upon::{Engine, Template};

pub const DEFAULT_TEMPLATE: &str = "{{ date }}/{{ account }}/{{ container }}/{{ name }}";
const STAMP_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year][month][day][hour][minute][second]");

/// Generates download paths from a [`TransferItem`] and a user-defined
/// template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at startup rather than half-way through a batch.
///
/// Blob names containing `..` segments are refused before rendering, so one
/// container can never write into another's directory. The rendered path is
/// then validated by [`blobrob_storage::validate_path`].
pub struct PathGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
}
impl FromStr for PathGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::InvalidTemplate)?;
        Ok(Self { engine, template })
    }
}
impl PathGenerator {
    /// Renders the template for `item`, as downloaded on `date`.
    #[instrument(skip_all, fields(item = %item))]
    pub fn generate(&self, item: &TransferItem, date: Date) -> Result<PathBuf> {
        check_name(&item.name)?;
        let rendered = self
            .template
            .render(&self.engine, Self::parameters(item, date))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        validate_path(rendered.trim()).or_raise(|| ErrorKind::Template)
    }

    fn parameters(item: &TransferItem, date: Date) -> upon::Value {
        let name = match &item.revision {
            Some(revision) => revision_file_name(&item.name, revision),
            None => item.name.clone(),
        };
        upon::value! {
            date: date.to_string(),
            account: &item.account,
            container: &item.container,
            name: name,
            blob: &item.name,
            revision: item.revision.as_ref().map(Revision::as_str),
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    let climbs = Path::new(name).components().any(|c| matches!(c, Component::ParentDir));
    if climbs || validate_path(name).is_err() {
        exn::bail!(ErrorKind::UnsafeName(name.to_string()));
    }
    Ok(())
}

/// Inserts a revision stamp before the extension of the final path segment:
/// `logs/app.log` pinned to `2024-03-01T10:00:00.1234567Z` becomes
/// `logs/app_20240301100000.log`. Revisions that aren't timestamps are used
/// verbatim.
pub fn revision_file_name(name: &str, revision: &Revision) -> String {
    let raw = revision.as_str();
    let stamp = OffsetDateTime::parse(raw, &Rfc3339)
        .ok()
        .and_then(|ts| ts.to_offset(UtcOffset::UTC).format(STAMP_FORMAT).ok())
        .unwrap_or_else(|| raw.to_string());
    let segment_start = name.rfind('/').map_or(0, |i| i + 1);
    // A leading dot is a hidden file, not an extension.
    match name[segment_start..].rfind('.').filter(|&i| i > 0) {
        Some(dot) => {
            let (stem, ext) = name.split_at(segment_start + dot);
            format!("{stem}_{stamp}{ext}")
        },
        None => format!("{name}_{stamp}"),
    }
}

/// Custom [`upon`] extensions.
mod addons {
    use upon::Engine;

    /// Truncates a string to a maximum byte length at a character boundary.
    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::date;

    fn default_generator() -> PathGenerator {
        DEFAULT_TEMPLATE.parse().unwrap()
    }

    fn version(id: &str) -> Revision {
        Revision::Version(id.to_string())
    }

    #[test]
    fn test_default_template() {
        let item = TransferItem::new("contoso", "web", "index.html");
        let path = default_generator().generate(&item, date!(2024 - 01 - 31)).unwrap();
        assert_eq!(path, Path::new("2024-01-31/contoso/web/index.html"));
    }

    #[test]
    fn test_pinned_revision_gets_stamped_name() {
        let item =
            TransferItem::new("contoso", "web", "css/site.css").with_revision(version("2024-03-01T10:20:30.1234567Z"));
        let path = default_generator().generate(&item, date!(2024 - 03 - 02)).unwrap();
        assert_eq!(path, Path::new("2024-03-02/contoso/web/css/site_20240301102030.css"));
    }

    #[rstest]
    #[case("report.pdf", "2024-03-01T10:20:30Z", "report_20240301102030.pdf")]
    #[case("archive.tar.gz", "2024-03-01T10:20:30Z", "archive.tar_20240301102030.gz")]
    #[case("README", "2024-03-01T10:20:30Z", "README_20240301102030")]
    #[case(".env", "2024-03-01T10:20:30Z", ".env_20240301102030")]
    #[case("v1.2/notes", "2024-03-01T10:20:30Z", "v1.2/notes_20240301102030")]
    #[case("data.json", "opaque-id", "data_opaque-id.json")]
    fn test_revision_file_name(#[case] name: &str, #[case] revision: &str, #[case] expected: &str) {
        assert_eq!(revision_file_name(name, &version(revision)), expected);
    }

    #[test]
    fn test_snapshot_stamp_matches_version_stamp() {
        let snapshot = Revision::Snapshot("2024-03-01T10:20:30.0000000Z".into());
        assert_eq!(revision_file_name("a.txt", &snapshot), "a_20240301102030.txt");
    }

    #[test]
    fn test_custom_template_variables() {
        let generator: PathGenerator = "{{ account }}-{{ container }}/{{ blob }}/{{ name }}".parse().unwrap();
        let item = TransferItem::new("acct", "data", "a/b.txt").with_revision(version("v1"));
        let path = generator.generate(&item, date!(2024 - 01 - 01)).unwrap();
        assert_eq!(path, Path::new("acct-data/a/b.txt/a/b_v1.txt"));
    }

    #[test]
    fn test_truncate_function() {
        let generator: PathGenerator = "{{ truncate(blob, 4) }}".parse().unwrap();
        let item = TransferItem::new("acct", "web", "abcdefgh");
        assert_eq!(generator.generate(&item, date!(2024 - 01 - 01)).unwrap(), Path::new("abcd"));
    }

    #[rstest]
    #[case("../../../../etc/passwd")]
    #[case("../../victim/web/index.html")]
    #[case("../../../x.txt")]
    #[case("../data/secret.txt")]
    #[case("a/../b.txt")]
    #[case("")]
    #[case("/")]
    fn test_unsafe_blob_names_are_rejected(#[case] name: &str) {
        let item = TransferItem::new("attacker", "web", name);
        let err = default_generator().generate(&item, date!(2024 - 01 - 01)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsafeName(_)));
    }

    #[test]
    fn test_template_escaping_the_root_is_rejected() {
        let generator: PathGenerator = "../{{ name }}".parse().unwrap();
        let item = TransferItem::new("acct", "web", "a.txt");
        let err = generator.generate(&item, date!(2024 - 01 - 01)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[rstest]
    #[case("/index.html", "2024-01-01/acct/web/index.html")]
    #[case("./css//site.css", "2024-01-01/acct/web/css/site.css")]
    #[case("notes..txt", "2024-01-01/acct/web/notes..txt")]
    fn test_harmless_names_are_normalised(#[case] name: &str, #[case] expected: &str) {
        let item = TransferItem::new("acct", "web", name);
        let path = default_generator().generate(&item, date!(2024 - 01 - 01)).unwrap();
        assert_eq!(path, Path::new(expected));
    }

    #[test]
    fn test_invalid_template_fails_at_parse_time() {
        let err = "{{ account ".parse::<PathGenerator>().err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidTemplate));
    }
}
