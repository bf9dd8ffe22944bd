//! Overleaf web API client.
//!
//! Thin wrappers over the endpoints the web editor itself uses. Every call is
//! a single round trip (plus a cached CSRF token fetch for mutations); nothing
//! is retried here.

use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, REFERER};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use super::socket::SocketSession;
use super::types::{Project, ProjectsBlob, Tag, UploadResponse};
use crate::config::ClientConfig;
use crate::error::{OverleafError, Result};
use crate::fs::EntityKind;
use crate::http::HttpClient;
use crate::session::Cookies;

/// Largest upload the web endpoint accepts.
pub const MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

const CSRF_META: &str = "ol-csrfToken";
const PROJECTS_META: &str = "ol-prefetchedProjectsBlob";
const TAGS_META: &str = "ol-tags";
const UPLOAD_MIME: &str = "application/octet-stream";

fn content_attr() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bcontent="([^"]*)""#).ok())
        .as_ref()
}

/// Extract the (unescaped) `content` of `<meta name="...">`.
pub(crate) fn meta_content(html: &str, name: &str) -> Option<String> {
    let tag = Regex::new(&format!(
        r#"<meta\b[^>]*\bname="{}"[^>]*>"#,
        regex::escape(name)
    ))
    .ok()?;
    let tag = tag.find(html)?.as_str();
    let content = content_attr()?.captures(tag)?.get(1)?.as_str();
    Some(html_unescape(content))
}

/// Undo the entity escaping applied to attribute values.
pub(crate) fn html_unescape(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#x22;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse the dashboard's project blob and attach tags.
pub(crate) fn parse_projects(
    blob: &str,
    tags: Option<&str>,
    include_trashed: bool,
    include_archived: bool,
) -> Result<Vec<Project>> {
    let blob: ProjectsBlob = serde_json::from_str(blob)?;
    let mut projects: Vec<Project> = blob
        .projects
        .into_iter()
        .filter(|p| include_trashed || !p.trashed)
        .filter(|p| include_archived || !p.archived)
        .collect();

    if let Some(tags) = tags {
        let tags: Vec<Tag> = serde_json::from_str(tags)?;
        for tag in tags {
            for project in projects
                .iter_mut()
                .filter(|p| tag.project_ids.contains(&p.id))
            {
                project.tags.push(tag.clone());
            }
        }
    }
    Ok(projects)
}

/// Remote 404 for an id we passed means that id is stale.
fn stale_on_not_found(err: OverleafError, id: &str) -> OverleafError {
    match err {
        OverleafError::NotFound { id: None, .. } => OverleafError::stale(id),
        other => other,
    }
}

/// Overleaf API client.
#[derive(Debug)]
pub struct ApiClient {
    http: HttpClient,
    config: ClientConfig,
    cookie_header: String,
    /// `(project_id, token)` of the last project page fetched
    csrf_cache: Mutex<Option<(String, String)>>,
}

impl ApiClient {
    /// Create a new API client for an authenticated browser session.
    pub fn new(config: ClientConfig, cookies: &Cookies) -> Result<Self> {
        config.validate()?;
        let cookie_header = cookies.to_header();
        Ok(Self {
            http: HttpClient::new(&config, &cookie_header)?,
            config,
            cookie_header,
            csrf_cache: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// List the projects on the user's dashboard.
    ///
    /// # Arguments
    /// * `include_trashed` - Also return trashed projects
    /// * `include_archived` - Also return archived projects
    pub async fn projects(&self, include_trashed: bool, include_archived: bool) -> Result<Vec<Project>> {
        let page = self.http.get(&self.url("/project")).await?.text();
        let blob = meta_content(&page, PROJECTS_META).ok_or_else(|| {
            OverleafError::InvalidResponse("project list not found in dashboard page".to_string())
        })?;
        let tags = meta_content(&page, TAGS_META);
        parse_projects(&blob, tags.as_deref(), include_trashed, include_archived)
    }

    /// Fetch (or reuse) the CSRF token for a project.
    ///
    /// Loading the project page also tells an invalid project id apart
    /// (`NotFound`) from an expired session (`Unauthorized`).
    pub async fn csrf_token(&self, project_id: &str) -> Result<String> {
        if let Ok(cache) = self.csrf_cache.lock() {
            if let Some((cached_project, token)) = cache.as_ref() {
                if cached_project == project_id {
                    return Ok(token.clone());
                }
            }
        }

        let page = self
            .http
            .get(&self.url(&format!("/project/{}", project_id)))
            .await?
            .text();
        let token = meta_content(&page, CSRF_META).ok_or_else(|| {
            OverleafError::InvalidResponse("CSRF token not found in project page".to_string())
        })?;

        if let Ok(mut cache) = self.csrf_cache.lock() {
            *cache = Some((project_id.to_string(), token.clone()));
        }
        Ok(token)
    }

    async fn mutation_headers(&self, project_id: &str) -> Result<HeaderMap> {
        let token = self.csrf_token(project_id).await?;
        let referer = self.url(&format!("/project/{}", project_id));

        let mut headers = HeaderMap::new();
        let invalid = |e: reqwest::header::InvalidHeaderValue| {
            OverleafError::Custom(format!("Invalid header value: {}", e))
        };
        headers.insert(REFERER, HeaderValue::from_str(&referer).map_err(invalid)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-csrf-token", HeaderValue::from_str(&token).map_err(invalid)?);
        Ok(headers)
    }

    /// socket.io handshake; returns the session id.
    async fn socket_handshake(&self, project_id: &str) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let body = self
            .http
            .get(&self.url(&format!(
                "/socket.io/1/?projectId={}&t={}",
                project_id, now
            )))
            .await?
            .text();
        body.split(':')
            .next()
            .filter(|sid| !sid.is_empty())
            .map(|sid| sid.to_string())
            .ok_or_else(|| OverleafError::InvalidResponse(format!("bad socket.io handshake: {}", body)))
    }

    /// Join the project's real-time channel, run `op`, and leave.
    ///
    /// `op` receives the `joinProjectResponse` payload. The socket is
    /// blocking, so the whole exchange runs on the blocking pool.
    async fn with_socket<T, F>(&self, project_id: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SocketSession, Value) -> Result<T> + Send + 'static,
    {
        let sid = self.socket_handshake(project_id).await?;
        let url = format!(
            "{}/socket.io/1/websocket/{}?projectId={}",
            self.config.websocket_base(),
            sid,
            project_id
        );
        let cookie_header = self.cookie_header.clone();
        let config = self.config.clone();
        tracing::debug!(project_id, "opening project socket");

        tokio::task::spawn_blocking(move || {
            let mut socket = SocketSession::connect(&url, &cookie_header, &config)?;
            let result = socket
                .wait_join_project()
                .and_then(|joined| op(&mut socket, joined));
            socket.close();
            result
        })
        .await
        .map_err(|e| OverleafError::WebSocket(format!("socket task failed: {}", e)))?
    }

    /// Fetch the project description (including `rootFolder`).
    pub async fn join_project(&self, project_id: &str) -> Result<Value> {
        // Resolves invalid project ids to NotFound before opening a socket.
        self.csrf_token(project_id).await?;
        self.with_socket(project_id, |_, joined| {
            joined
                .get("project")
                .cloned()
                .ok_or_else(|| OverleafError::InvalidResponse("joinProjectResponse without project".to_string()))
        })
        .await
    }

    /// Read the current text of a doc.
    pub async fn read_doc(&self, project_id: &str, doc_id: &str) -> Result<String> {
        let doc_id = doc_id.to_string();
        self.with_socket(project_id, move |socket, _| socket.read_doc(&doc_id))
            .await
    }

    /// Read several docs over one socket session, in the order given.
    pub async fn read_docs(&self, project_id: &str, doc_ids: &[String]) -> Result<Vec<String>> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let doc_ids = doc_ids.to_vec();
        self.with_socket(project_id, move |socket, _| {
            doc_ids.iter().map(|id| socket.read_doc(id)).collect()
        })
        .await
    }

    /// Create a folder; returns the folder JSON (`_id`, `name`, ...).
    pub async fn create_folder(&self, project_id: &str, parent_folder_id: &str, name: &str) -> Result<Value> {
        let headers = self.mutation_headers(project_id).await?;
        let response = self
            .http
            .post_json(
                &self.url(&format!("/project/{}/folder", project_id)),
                headers,
                &json!({
                    "parent_folder_id": parent_folder_id,
                    "name": name,
                }),
            )
            .await
            .map_err(|e| stale_on_not_found(e, parent_folder_id))?;
        response.json()
    }

    /// Upload content under `name` in a folder.
    ///
    /// Overleaf replaces an existing entity of the same name and turns text
    /// uploads into docs; the response says which kind was stored.
    pub async fn upload_file(
        &self,
        project_id: &str,
        folder_id: &str,
        name: &str,
        content: Vec<u8>,
    ) -> Result<UploadResponse> {
        let size = content.len() as u64;
        if size > MAX_UPLOAD_SIZE {
            return Err(OverleafError::PayloadTooLarge {
                path: String::new(),
                size,
            });
        }

        let headers = self.mutation_headers(project_id).await?;
        let part = Part::bytes(content)
            .file_name(name.to_string())
            .mime_str(UPLOAD_MIME)?;
        let form = Form::new()
            .text("relativePath", "null")
            .text("name", name.to_string())
            .text("type", UPLOAD_MIME)
            .part("qqfile", part);

        let response = self
            .http
            .post_multipart(
                &self.url(&format!(
                    "/project/{}/upload?folder_id={}",
                    project_id, folder_id
                )),
                headers,
                form,
            )
            .await
            .map_err(|e| match e {
                OverleafError::PayloadTooLarge { path, .. } => {
                    OverleafError::PayloadTooLarge { path, size }
                }
                other => stale_on_not_found(other, folder_id),
            })?;

        let upload: UploadResponse = serde_json::from_slice(&response.body).map_err(|_| {
            match crate::api::error::status_error(422, &response.body) {
                OverleafError::PayloadTooLarge { path, .. } => {
                    OverleafError::PayloadTooLarge { path, size }
                }
                _ => OverleafError::InvalidResponse(format!("upload rejected: {}", response.text())),
            }
        })?;
        if !upload.success {
            return Err(OverleafError::InvalidResponse(format!(
                "upload rejected: {}",
                response.text()
            )));
        }
        Ok(upload)
    }

    /// Download a binary file.
    pub async fn download_file(&self, project_id: &str, file_id: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(&self.url(&format!("/project/{}/file/{}", project_id, file_id)))
            .await
            .map_err(|e| stale_on_not_found(e, file_id))?;
        Ok(response.body)
    }

    /// Delete a file, doc or folder (folders recursively).
    pub async fn delete_entity(&self, project_id: &str, kind: EntityKind, entity_id: &str) -> Result<()> {
        let headers = self.mutation_headers(project_id).await?;
        self.http
            .delete(
                &self.url(&format!(
                    "/project/{}/{}/{}",
                    project_id,
                    kind.as_str(),
                    entity_id
                )),
                headers,
            )
            .await
            .map_err(|e| stale_on_not_found(e, entity_id))?;
        Ok(())
    }

    /// Download the whole project as a zip archive.
    pub async fn download_project(&self, project_id: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(&self.url(&format!("/project/{}/download/zip", project_id)))
            .await?;
        Ok(response.body)
    }
}
