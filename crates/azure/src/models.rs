//! Listing models.
//!
//! The XML shapes returned by the List Blobs operation are private; callers
//! only ever see [`BlobInfo`].

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::Deserialize;
use std::fmt::{self, Display, Formatter};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;

/// Outcome of a container probe.
///
/// `public` means the listing request was allowed with whatever credentials
/// the client carries, so with a bearer token a "public" container may well
/// be a private one the token can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerProbe {
    pub exists: bool,
    pub public: bool,
}
impl ContainerProbe {
    pub const MISSING: Self = Self { exists: false, public: false };
    pub const PRIVATE: Self = Self { exists: true, public: false };
    pub const PUBLIC: Self = Self { exists: true, public: true };
}

/// A specific historical revision of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    /// `x-ms-version-id`, requested with `?versionId=`
    Version(String),
    /// Snapshot timestamp, requested with `?snapshot=`
    Snapshot(String),
}
impl Revision {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Version(id) | Self::Snapshot(id) => id,
        }
    }

    /// Query parameter selecting this revision on a download.
    pub(crate) fn query_key(&self) -> &'static str {
        match self {
            Self::Version(_) => "versionId",
            Self::Snapshot(_) => "snapshot",
        }
    }
}
impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a container listing.
///
/// With versions included, the same `name` shows up once per version (and
/// once per snapshot).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
    pub revision: Option<Revision>,
    pub is_current_version: Option<bool>,
    pub deleted: bool,
}
impl BlobInfo {
    /// A plain, unversioned, live blob.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            content_type: None,
            last_modified: None,
            revision: None,
            is_current_version: None,
            deleted: false,
        }
    }

    pub fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_current_version(mut self, current: bool) -> Self {
        self.is_current_version = Some(current);
        self
    }

    pub fn with_deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.revision, Some(Revision::Snapshot(_)))
    }

    /// The live blob, as opposed to an old version or a snapshot.
    pub fn is_current(&self) -> bool {
        match &self.revision {
            None => true,
            Some(Revision::Version(_)) => self.is_current_version == Some(true),
            Some(Revision::Snapshot(_)) => false,
        }
    }
}

/// One page of a List Blobs response.
#[derive(Debug, Default)]
pub(crate) struct ListPage {
    pub blobs: Vec<BlobInfo>,
    pub next_marker: Option<String>,
}
impl ListPage {
    pub(crate) fn parse(body: &str) -> Result<Self> {
        // Azure prefixes its XML with a UTF-8 BOM.
        let body = body.trim_start_matches('\u{feff}');
        let results: EnumerationResults =
            quick_xml::de::from_str(body).or_raise(|| ErrorKind::InvalidResponse("malformed blob listing".into()))?;
        Ok(Self {
            blobs: results.blobs.blob.into_iter().map(BlobInfo::from).collect(),
            next_marker: results.next_marker.filter(|marker| !marker.is_empty()),
        })
    }
}

#[derive(Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: Blobs,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Deserialize, Default)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobXml>,
}

#[derive(Deserialize)]
struct BlobXml {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Snapshot", default)]
    snapshot: Option<String>,
    #[serde(rename = "VersionId", default)]
    version_id: Option<String>,
    #[serde(rename = "IsCurrentVersion", default)]
    is_current_version: Option<bool>,
    #[serde(rename = "Deleted", default)]
    deleted: Option<bool>,
    #[serde(rename = "Properties", default)]
    properties: PropertiesXml,
}

#[derive(Deserialize, Default)]
struct PropertiesXml {
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
    #[serde(rename = "Content-Type", default)]
    content_type: Option<String>,
    #[serde(rename = "DeletedTime", default)]
    deleted_time: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<BlobXml> for BlobInfo {
    fn from(xml: BlobXml) -> Self {
        let version_id = non_empty(xml.version_id);
        let revision = match (version_id, non_empty(xml.snapshot)) {
            (_, Some(snapshot)) => Some(Revision::Snapshot(snapshot)),
            (Some(version), None) => Some(Revision::Version(version)),
            (None, None) => None,
        };
        let is_old_version = matches!(revision, Some(Revision::Version(_))) && xml.is_current_version != Some(true);
        let deleted =
            xml.deleted.unwrap_or(false) || non_empty(xml.properties.deleted_time).is_some() || is_old_version;
        let last_modified = xml
            .properties
            .last_modified
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc2822).ok());
        Self {
            name: xml.name,
            size: xml.properties.content_length.unwrap_or(0),
            content_type: non_empty(xml.properties.content_type),
            last_modified,
            revision,
            is_current_version: xml.is_current_version,
            deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONED_PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="web">
  <Blobs>
    <Blob>
      <Name>index.html</Name>
      <VersionId>2024-03-01T10:00:00.0000000Z</VersionId>
      <IsCurrentVersion>true</IsCurrentVersion>
      <Properties>
        <Content-Length>120</Content-Length>
        <Content-Type>text/html</Content-Type>
        <BlobType>BlockBlob</BlobType>
      </Properties>
    </Blob>
    <Blob>
      <Name>index.html</Name>
      <VersionId>2024-02-01T10:00:00.0000000Z</VersionId>
      <Properties>
        <Content-Length>80</Content-Length>
      </Properties>
    </Blob>
    <Blob>
      <Name>gone.txt</Name>
      <Deleted>true</Deleted>
      <Properties>
        <Content-Length>5</Content-Length>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!88!token</NextMarker>
</EnumerationResults>"#;

    #[test]
    fn test_parse_versioned_page() {
        let page = ListPage::parse(VERSIONED_PAGE).unwrap();
        assert_eq!(page.next_marker.as_deref(), Some("2!88!token"));
        assert_eq!(page.blobs.len(), 3);

        let current = &page.blobs[0];
        assert_eq!(current.name, "index.html");
        assert_eq!(current.size, 120);
        assert_eq!(current.content_type.as_deref(), Some("text/html"));
        assert_eq!(current.revision, Some(Revision::Version("2024-03-01T10:00:00.0000000Z".into())));
        assert!(current.is_current());
        assert!(!current.deleted);

        let old = &page.blobs[1];
        assert!(!old.is_current());
        assert!(old.deleted, "non-current versions count as deleted");

        let gone = &page.blobs[2];
        assert_eq!(gone.revision, None);
        assert!(gone.deleted);
    }

    #[test]
    fn test_parse_last_page_with_bom_and_empty_marker() {
        let body = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults ContainerName=\"web\"><Blobs><Blob><Name>a.txt</Name><Snapshot>2024-01-01T00:00:00.0000000Z</Snapshot><Properties><Content-Length>1</Content-Length></Properties></Blob></Blobs><NextMarker /></EnumerationResults>";
        let page = ListPage::parse(body).unwrap();
        assert_eq!(page.next_marker, None);
        assert!(page.blobs[0].is_snapshot());
        assert!(!page.blobs[0].is_current());
    }

    #[test]
    fn test_parse_empty_container() {
        let page = ListPage::parse("<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>").unwrap();
        assert!(page.blobs.is_empty());
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn test_deleted_time_marks_deleted() {
        let body = "<EnumerationResults><Blobs><Blob><Name>x</Name><Properties><DeletedTime>Mon, 01 Jan 2024 00:00:00 GMT</DeletedTime></Properties></Blob></Blobs></EnumerationResults>";
        let page = ListPage::parse(body).unwrap();
        assert!(page.blobs[0].deleted);
    }

    #[test]
    fn test_blob_without_name_is_invalid_response() {
        let body = "<EnumerationResults><Blobs><Blob><Size>1</Size></Blob></Blobs></EnumerationResults>";
        let err = ListPage::parse(body).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidResponse(_)));
    }
}
