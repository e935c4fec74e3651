//! HTTP client for the Blob Storage REST API.
//!
//! Only anonymous (or opaque bearer token) access is supported: no shared
//! key signing, no SAS generation.

use crate::error::{ErrorKind, Result};
use crate::models::{BlobInfo, ContainerProbe, ListPage, Revision};
use crate::{BlobReader, ObjectSource, Probe};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::TryStreamExt;
use reqwest::header::{AUTHORIZATION, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode, Url};
use std::fmt::Write;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://{account}.blob.core.windows.net";
pub const DEFAULT_USER_AGENT: &str = concat!("blobrob/", env!("CARGO_PKG_VERSION"));
/// Oldest service version that understands `include=versions`.
pub const API_VERSION: &str = "2019-12-12";
/// Tracing target carrying the `curl` equivalent of every request.
pub const CURL_TARGET: &str = "blobrob::curl";
const ACCOUNT_PLACEHOLDER: &str = "{account}";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// URL template, `{account}` is replaced with the storage account name.
    pub endpoint: String,
    pub user_agent: String,
    /// Forwarded verbatim as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    pub api_version: String,
    /// Applies to probes only, downloads can take as long as they take.
    pub probe_timeout: Duration,
}
impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
            api_version: API_VERSION.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Blob Storage client implementing both [`Probe`] and [`ObjectSource`].
///
/// # Examples
///
/// ```no_run
/// use blobrob_azure::{BlobClient, ClientOptions, Probe};
///
/// # async fn example() -> blobrob_azure::error::Result<()> {
/// let client = BlobClient::new(ClientOptions::default())?;
/// if client.probe_account("contoso").await {
///     let probe = client.probe_container("contoso", "$web").await;
///     println!("exists={} public={}", probe.exists, probe.public);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlobClient {
    http: reqwest::Client,
    options: ClientOptions,
}

impl BlobClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        if !options.endpoint.contains(ACCOUNT_PLACEHOLDER) {
            exn::bail!(ErrorKind::InvalidTarget(format!(
                "endpoint `{}` has no {ACCOUNT_PLACEHOLDER} placeholder",
                options.endpoint
            )));
        }
        HeaderValue::from_str(&options.user_agent)
            .or_raise(|| ErrorKind::InvalidTarget(format!("user agent `{}`", options.user_agent)))?;
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .build()
            .or_raise(|| ErrorKind::Transport("failed to build HTTP client".into()))?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Storage account names are lowercase alphanumerics. Anything else
    /// would end up in the hostname, so it's refused outright.
    fn account_url(&self, account: &str) -> Result<Url> {
        if account.is_empty() || !account.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            exn::bail!(ErrorKind::InvalidTarget(format!("account name `{account}`")));
        }
        let raw = self.options.endpoint.replace(ACCOUNT_PLACEHOLDER, account);
        Url::parse(&raw).or_raise(|| ErrorKind::InvalidTarget(raw.clone()))
    }

    fn object_url<'a>(&self, account: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
        let mut url = self.account_url(account)?;
        url.path_segments_mut()
            .ok()
            .ok_or_raise(|| ErrorKind::InvalidTarget(format!("endpoint for `{account}` cannot hold a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn container_url(&self, account: &str, container: &str) -> Result<Url> {
        self.object_url(account, [container])
    }

    /// Blob names keep their `/` separators, every segment is escaped
    /// individually.
    fn blob_url(&self, account: &str, container: &str, name: &str) -> Result<Url> {
        self.object_url(account, std::iter::once(container).chain(name.split('/')))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(USER_AGENT, &self.options.user_agent)
            .header("x-ms-version", &self.options.api_version);
        match &self.options.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let request = builder.build()?;
        log_curl(&request);
        self.http.execute(request).await
    }

    async fn list_page(
        &self,
        account: &str,
        container: &str,
        include_versions: bool,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ListPage> {
        let target = format!("{account}/{container}");
        let mut url = self.container_url(account, container)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container").append_pair("comp", "list");
            if include_versions {
                query.append_pair("include", "versions");
            }
            if let Some(prefix) = prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        let response =
            self.send(self.request(Method::GET, url)).await.or_raise(|| ErrorKind::Transport(target.clone()))?;
        if response.status() != StatusCode::OK {
            exn::bail!(ErrorKind::from_status(response.status().as_u16(), target));
        }
        let body = response.text().await.or_raise(|| ErrorKind::Transport(target.clone()))?;
        ListPage::parse(&body)
    }

    /// Follows `NextMarker` until the listing is exhausted.
    async fn list_all(
        &self,
        account: &str,
        container: &str,
        include_versions: bool,
        prefix: Option<&str>,
    ) -> Result<Vec<BlobInfo>> {
        let mut blobs = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self.list_page(account, container, include_versions, prefix, marker.as_deref()).await?;
            tracing::debug!(account, container, entries = page.blobs.len(), "Listed page");
            blobs.extend(page.blobs);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(blobs)
    }
}

fn log_curl(request: &Request) {
    if !tracing::enabled!(target: CURL_TARGET, tracing::Level::DEBUG) {
        return;
    }
    let mut command = format!("curl -X {} '{}'", request.method(), request.url());
    for (name, value) in request.headers() {
        let value = match (name == AUTHORIZATION, value.to_str()) {
            (true, _) => "Bearer <redacted>",
            (false, Ok(value)) => value,
            (false, Err(_)) => "<binary>",
        };
        let _ = write!(command, " -H '{name}: {value}'");
    }
    tracing::debug!(target: CURL_TARGET, "{command}");
}

#[async_trait]
impl Probe for BlobClient {
    async fn probe_account(&self, account: &str) -> bool {
        let url = match self.account_url(account) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(account, error = ?e, "Skipping unprobeable account");
                return false;
            },
        };
        let request = self.request(Method::HEAD, url).timeout(self.options.probe_timeout);
        match self.send(request).await {
            // Any HTTP answer at all means the name resolved to an account.
            Ok(response) => {
                tracing::debug!(account, status = response.status().as_u16(), "Account exists");
                true
            },
            Err(e) => {
                tracing::trace!(account, error = %e, "Account probe failed");
                false
            },
        }
    }

    async fn probe_container(&self, account: &str, container: &str) -> ContainerProbe {
        let Ok(mut url) = self.container_url(account, container) else {
            return ContainerProbe::MISSING;
        };
        url.query_pairs_mut()
            .append_pair("restype", "container")
            .append_pair("comp", "list")
            .append_pair("maxresults", "1");
        let request = self.request(Method::GET, url).timeout(self.options.probe_timeout);
        match self.send(request).await {
            Ok(response) => match response.status() {
                StatusCode::OK => ContainerProbe::PUBLIC,
                StatusCode::FORBIDDEN => ContainerProbe::PRIVATE,
                _ => ContainerProbe::MISSING,
            },
            Err(e) => {
                tracing::trace!(account, container, error = %e, "Container probe failed");
                ContainerProbe::MISSING
            },
        }
    }
}

#[async_trait]
impl ObjectSource for BlobClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list(&self, account: &str, container: &str) -> Result<Vec<BlobInfo>> {
        match self.list_all(account, container, true, None).await {
            Ok(blobs) => Ok(blobs),
            // Accounts without versioning (or older service versions behind
            // emulators) reject `include=versions`; a plain listing still works.
            Err(e) => {
                tracing::debug!(account, container, error = ?e, "Versioned listing failed; retrying without versions");
                self.list_all(account, container, false, None).await
            },
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn versions(&self, account: &str, container: &str, name: &str) -> Result<Vec<BlobInfo>> {
        let mut blobs = self.list_all(account, container, true, Some(name)).await?;
        blobs.retain(|blob| blob.name == name);
        Ok(blobs)
    }

    #[tracing::instrument(level = "debug", skip(self, revision), fields(revision = revision.map(Revision::as_str)))]
    async fn open(&self, account: &str, container: &str, name: &str, revision: Option<&Revision>) -> Result<BlobReader> {
        let target = format!("{account}/{container}/{name}");
        let mut url = self.blob_url(account, container, name)?;
        if let Some(revision) = revision {
            url.query_pairs_mut().append_pair(revision.query_key(), revision.as_str());
        }
        let response =
            self.send(self.request(Method::GET, url)).await.or_raise(|| ErrorKind::Transport(target.clone()))?;
        if response.status() != StatusCode::OK {
            exn::bail!(ErrorKind::from_status(response.status().as_u16(), target));
        }
        let length = response.content_length();
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(BlobReader {
            reader: Box::new(Box::pin(body).into_async_read()),
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::AsyncReadExt;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Handler = dyn Fn(&str, &str) -> (u16, String) + Send + Sync;

    /// A one-request-per-connection HTTP server answering from `handler`,
    /// which gets the method and the request target (path and query).
    struct StubServer {
        endpoint: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start(handler: impl Fn(&str, &str) -> (u16, String) + Send + Sync + 'static) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&requests);
            let handler: Arc<Handler> = Arc::new(handler);
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head);
                    let mut request_line = head.split_whitespace();
                    let method = request_line.next().unwrap_or_default().to_string();
                    let target = request_line.next().unwrap_or_default().to_string();
                    seen.lock().unwrap().push(format!("{method} {target}"));
                    let (status, body) = handler(&method, &target);
                    let mut response =
                        format!("HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", body.len());
                    if method != "HEAD" {
                        response.push_str(&body);
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self {
                endpoint: format!("http://127.0.0.1:{port}/{{account}}"),
                requests,
            }
        }

        fn client(&self) -> BlobClient {
            BlobClient::new(ClientOptions {
                endpoint: self.endpoint.clone(),
                probe_timeout: Duration::from_secs(5),
                ..ClientOptions::default()
            })
            .unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn page(names: &[&str], next_marker: Option<&str>) -> String {
        let blobs: String = names
            .iter()
            .map(|name| format!("<Blob><Name>{name}</Name><Properties><Content-Length>1</Content-Length></Properties></Blob>"))
            .collect();
        let marker = next_marker.map_or("<NextMarker />".to_string(), |m| format!("<NextMarker>{m}</NextMarker>"));
        format!("<?xml version=\"1.0\" encoding=\"utf-8\"?><EnumerationResults><Blobs>{blobs}</Blobs>{marker}</EnumerationResults>")
    }

    fn names(blobs: &[BlobInfo]) -> Vec<&str> {
        blobs.iter().map(|blob| blob.name.as_str()).collect()
    }

    #[rstest]
    #[case(200)]
    #[case(400)]
    #[case(404)]
    #[tokio::test]
    async fn test_any_http_answer_means_account_exists(#[case] status: u16) {
        let server = StubServer::start(move |_, _| (status, String::new())).await;
        assert!(server.client().probe_account("contoso").await);
        assert_eq!(server.requests(), ["HEAD /contoso"]);
    }

    #[tokio::test]
    async fn test_unreachable_account_is_missing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = BlobClient::new(ClientOptions {
            endpoint: format!("http://127.0.0.1:{port}/{{account}}"),
            ..ClientOptions::default()
        })
        .unwrap();
        assert!(!client.probe_account("contoso").await);
    }

    #[rstest]
    #[case(200, ContainerProbe::PUBLIC)]
    #[case(403, ContainerProbe::PRIVATE)]
    #[case(404, ContainerProbe::MISSING)]
    #[case(401, ContainerProbe::MISSING)]
    #[case(500, ContainerProbe::MISSING)]
    #[tokio::test]
    async fn test_container_probe_status_mapping(#[case] status: u16, #[case] expected: ContainerProbe) {
        let server = StubServer::start(move |_, _| (status, page(&[], None))).await;
        assert_eq!(server.client().probe_container("contoso", "web").await, expected);
        assert_eq!(server.requests(), ["GET /contoso/web?restype=container&comp=list&maxresults=1"]);
    }

    #[tokio::test]
    async fn test_listing_follows_next_marker() {
        let server = StubServer::start(|_, target| {
            if target.contains("marker=page2") {
                (200, page(&["c.txt"], None))
            } else {
                (200, page(&["a.txt", "b.txt"], Some("page2")))
            }
        })
        .await;
        let blobs = server.client().list("contoso", "web").await.unwrap();
        assert_eq!(names(&blobs), ["a.txt", "b.txt", "c.txt"]);
        assert_eq!(server.requests(), [
            "GET /contoso/web?restype=container&comp=list&include=versions",
            "GET /contoso/web?restype=container&comp=list&include=versions&marker=page2",
        ]);
    }

    #[tokio::test]
    async fn test_listing_falls_back_without_versions() {
        let server = StubServer::start(|_, target| {
            if target.contains("include=versions") {
                (400, String::new())
            } else {
                (200, page(&["a.txt"], None))
            }
        })
        .await;
        let blobs = server.client().list("contoso", "web").await.unwrap();
        assert_eq!(names(&blobs), ["a.txt"]);
        assert_eq!(server.requests(), [
            "GET /contoso/web?restype=container&comp=list&include=versions",
            "GET /contoso/web?restype=container&comp=list",
        ]);
    }

    #[tokio::test]
    async fn test_listing_errors_when_both_attempts_fail() {
        let server = StubServer::start(|_, _| (403, String::new())).await;
        let err = server.client().list("contoso", "web").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AccessDenied(_)));
    }

    #[rstest]
    #[case(None, "GET /contoso/web/dir/a.txt")]
    #[case(Some(Revision::Version("v1".into())), "GET /contoso/web/dir/a.txt?versionId=v1")]
    #[case(Some(Revision::Snapshot("s1".into())), "GET /contoso/web/dir/a.txt?snapshot=s1")]
    #[tokio::test]
    async fn test_open_selects_revision_parameter(#[case] revision: Option<Revision>, #[case] expected: &str) {
        let server = StubServer::start(|_, _| (200, "hello".to_string())).await;
        let mut blob = server.client().open("contoso", "web", "dir/a.txt", revision.as_ref()).await.unwrap();
        assert_eq!(blob.length, Some(5));
        let mut body = Vec::new();
        blob.reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(server.requests(), [expected]);
    }

    #[tokio::test]
    async fn test_open_maps_status() {
        let server = StubServer::start(|_, target| match target {
            "/contoso/web/missing.txt" => (404, String::new()),
            _ => (403, String::new()),
        })
        .await;
        let client = server.client();
        let missing = client.open("contoso", "web", "missing.txt", None).await.err().unwrap();
        assert!(matches!(&*missing, ErrorKind::NotFound(_)));
        let denied = client.open("contoso", "web", "secret.txt", None).await.err().unwrap();
        assert!(matches!(&*denied, ErrorKind::AccessDenied(_)));
    }

    fn client() -> BlobClient {
        BlobClient::new(ClientOptions::default()).unwrap()
    }

    #[test]
    fn test_endpoint_requires_placeholder() {
        let options = ClientOptions {
            endpoint: "https://example.com".into(),
            ..ClientOptions::default()
        };
        let err = BlobClient::new(options).err().unwrap();
        assert!(matches!(&*err, ErrorKind::InvalidTarget(_)));
    }

    #[rstest]
    #[case("contoso", true)]
    #[case("acct2024", true)]
    #[case("", false)]
    #[case("UPPER", false)]
    #[case("evil.com/x", false)]
    #[case("with-dash", false)]
    fn test_account_names(#[case] account: &str, #[case] valid: bool) {
        assert_eq!(client().account_url(account).is_ok(), valid);
    }

    #[test]
    fn test_container_url() {
        let url = client().container_url("contoso", "$web").unwrap();
        assert_eq!(url.as_str(), "https://contoso.blob.core.windows.net/$web");
    }

    #[test]
    fn test_blob_url_escapes_segments_but_keeps_slashes() {
        let url = client().blob_url("contoso", "data", "reports/q1 final#2.pdf").unwrap();
        assert_eq!(url.as_str(), "https://contoso.blob.core.windows.net/data/reports/q1%20final%232.pdf");
    }

    #[test]
    fn test_path_style_endpoint() {
        let options = ClientOptions {
            endpoint: "http://127.0.0.1:10000/{account}".into(),
            ..ClientOptions::default()
        };
        let client = BlobClient::new(options).unwrap();
        let url = client.blob_url("devstoreaccount1", "web", "index.html").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:10000/devstoreaccount1/web/index.html");
    }

    #[test]
    fn test_request_headers() {
        let options = ClientOptions {
            token: Some("secret".into()),
            ..ClientOptions::default()
        };
        let client = BlobClient::new(options).unwrap();
        let url = client.account_url("contoso").unwrap();
        let request = client.request(Method::HEAD, url).build().unwrap();
        let headers = request.headers();
        assert_eq!(headers[USER_AGENT], DEFAULT_USER_AGENT);
        assert_eq!(headers["x-ms-version"], API_VERSION);
        assert_eq!(headers[AUTHORIZATION], "Bearer secret");
    }

    #[tokio::test]
    async fn test_unprobeable_names_are_missing() {
        let client = client();
        assert!(!client.probe_account("Not A Host").await);
        assert_eq!(client.probe_container("Not A Host", "web").await, ContainerProbe::MISSING);
    }
}
