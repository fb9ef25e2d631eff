use crate::types::{CalendarObject, Folder};
use crate::xml;
use crate::{DavError, Result};
use parking_lot::Mutex;
use reqwest::Method;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal CalDAV client covering what the scheduling filter needs:
/// principal/home discovery, folder listing, UID search, PUT and DELETE.
pub struct DavClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    home: Mutex<Option<String>>,
}

impl DavClient {
    pub fn new(
        base_url: Url,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()?,
            base_url,
            username: username.into(),
            password: password.into(),
            home: Mutex::new(None),
        })
    }

    fn method(name: &str) -> Method {
        Method::from_bytes(name.as_bytes()).expect("statically valid HTTP method")
    }

    async fn request(
        &self,
        href: &str,
        method: &str,
        body: String,
        content_type: &str,
        depth: Option<&str>,
    ) -> Result<String> {
        let url = if href.is_empty() {
            self.base_url.clone()
        } else {
            self.base_url.join(href)?
        };

        tracing::debug!(%url, method, "DAV request");

        let mut request = self
            .http
            .request(Self::method(method), url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", content_type);
        if let Some(depth) = depth {
            request = request.header("Depth", depth).header("Prefer", "return-minimal");
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DavError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// The authenticated user's calendar home collection href.
    pub async fn discover(&self) -> Result<String> {
        if let Some(home) = self.home.lock().clone() {
            return Ok(home);
        }

        let response = self
            .request(
                "",
                "PROPFIND",
                xml::PROPFIND_PRINCIPAL.to_string(),
                "application/xml; charset=utf-8",
                Some("0"),
            )
            .await?;
        let principal = xml::parse_prop_href(&response, "current-user-principal")?
            .ok_or_else(|| DavError::Discovery("no current-user-principal".to_string()))?;

        let response = self
            .request(
                &principal,
                "PROPFIND",
                xml::PROPFIND_HOME.to_string(),
                "application/xml; charset=utf-8",
                Some("0"),
            )
            .await?;
        let home = xml::parse_prop_href(&response, "calendar-home-set")?
            .ok_or_else(|| DavError::Discovery("no calendar-home-set".to_string()))?;

        *self.home.lock() = Some(home.clone());
        Ok(home)
    }

    /// List calendar collections supporting the given component type.
    pub async fn list_folders(&self, component: &str) -> Result<Vec<Folder>> {
        let home = self.discover().await?;
        let response = self
            .request(
                &home,
                "PROPFIND",
                xml::PROPFIND_FOLDERS.to_string(),
                "application/xml; charset=utf-8",
                Some("1"),
            )
            .await?;

        let mut folders = Vec::new();
        for mut folder in xml::parse_folders(&response)? {
            if !folder.components.iter().any(|c| c == component) {
                continue;
            }
            if folder.owner.is_empty() {
                folder.owner = xml::owner_from_href(&folder.href);
            }
            folders.push(folder);
        }
        Ok(folders)
    }

    /// Find objects in a folder whose component UID equals `uid`.
    pub async fn search_by_uid(
        &self,
        folder_href: &str,
        component: &str,
        uid: &str,
    ) -> Result<Vec<CalendarObject>> {
        let response = self
            .request(
                folder_href,
                "REPORT",
                xml::calendar_query(component, uid),
                "application/xml; charset=utf-8",
                Some("1"),
            )
            .await?;
        xml::parse_report(&response)
    }

    /// Store a calendar object at its href (unconditional overwrite).
    pub async fn put(&self, object: &CalendarObject) -> Result<()> {
        self.request(
            &object.href,
            "PUT",
            object.data.clone(),
            "text/calendar; charset=utf-8",
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn delete(&self, href: &str) -> Result<()> {
        self.request(href, "DELETE", String::new(), "text/plain", None)
            .await?;
        Ok(())
    }
}
