//! Authenticated Overleaf session.

use std::path::Path;
use std::sync::Arc;

use super::cookies::Cookies;
use super::project::ProjectClient;
use crate::api::{ApiClient, Project};
use crate::config::ClientConfig;
use crate::error::{OverleafError, Result};
use crate::fs::ProjectIo;

/// Overleaf user session.
///
/// Built once from browser cookies and reused for every request. Project
/// clients created from it share its HTTP client and CSRF token cache.
#[derive(Debug, Clone)]
pub struct Session {
    api: Arc<ApiClient>,
    cookies: Cookies,
}

impl Session {
    /// Create a session from cookies.
    ///
    /// Nothing is sent to the server; an invalid session surfaces as
    /// `OverleafError::Unauthorized` on the first request.
    ///
    /// # Example
    /// ```no_run
    /// use overleaflib::{ClientConfig, Cookies, Session};
    ///
    /// # fn example() -> overleaflib::Result<()> {
    /// let cookies = Cookies::parse_header("overleaf_session2=...; GCLB=...");
    /// let session = Session::from_cookies(cookies, ClientConfig::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_cookies(cookies: Cookies, config: ClientConfig) -> Result<Self> {
        if cookies.is_empty() {
            return Err(OverleafError::Unauthorized("no session cookies".to_string()));
        }
        let api = ApiClient::new(config, &cookies)?;
        Ok(Self {
            api: Arc::new(api),
            cookies,
        })
    }

    /// Load a session from a cookie file written by [`save`](Self::save)
    /// or exported by a browser extension.
    ///
    /// # Returns
    /// `None` if the file does not exist
    pub fn load<P: AsRef<Path>>(path: P, config: ClientConfig) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let cookies = Cookies::load(path, &config.host()?)?;
        tracing::debug!(path = %path.display(), cookies = cookies.len(), "session cookies loaded");
        Self::from_cookies(cookies, config).map(Some)
    }

    /// Save the session cookies as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.cookies.save(path)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn config(&self) -> &ClientConfig {
        self.api.config()
    }

    /// List projects, skipping archived and trashed ones.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.api.projects(false, false).await
    }

    /// Find a project by exact name.
    pub async fn project_by_name(&self, name: &str) -> Result<Project> {
        self.projects()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| OverleafError::missing(name))
    }

    /// Remote tree client for one project.
    pub fn project(&self, project_id: &str) -> ProjectClient {
        ProjectClient::new(Arc::clone(&self.api), project_id)
    }

    /// Path-based access to one project.
    ///
    /// # Example
    /// ```no_run
    /// # use overleaflib::{MkdirOptions, Session};
    /// # async fn example(session: Session) -> overleaflib::Result<()> {
    /// let mut io = session.project_io("64f0c0ffee");
    /// io.mkdir("figures", MkdirOptions::all()).await?;
    /// io.write("figures/notes.txt", b"draft").await?;
    /// for entity in &io.listdir("figures").await? {
    ///     println!("{} ({})", entity.name(), entity.kind());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn project_io(&self, project_id: &str) -> ProjectIo<ProjectClient> {
        ProjectIo::new(self.project(project_id))
    }

    /// Download a project as a zip archive.
    pub async fn download_project(&self, project_id: &str) -> Result<Vec<u8>> {
        self.api.download_project(project_id).await
    }
}
