//! Web search and downloads.

use crate::error::HandlerError;
use crate::handler::CapabilityHandler;
use crate::params::{require, ParamRecord, WebParams};
use crate::registry::OperationGroup;
use async_trait::async_trait;
use deskpilot_core::{Arguments, ToolCallResult};
use reqwest::{header, Client, Url};
use serde::Deserialize;
use serde_json::{json, Map};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const MAX_RELATED_TOPICS: usize = 5;

#[derive(Debug, Clone)]
pub struct WebConfig {
    /// DuckDuckGo-compatible instant answer endpoint used by `search_web`.
    pub search_endpoint: String,
    /// Base for the search links returned by the image/video/news/academic
    /// searches.
    pub search_page: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            search_endpoint: "https://api.duckduckgo.com/".to_string(),
            search_page: "https://duckduckgo.com/".to_string(),
            user_agent: concat!("deskpilot/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SearchKind {
    Images,
    Videos,
    News,
    Academic,
}

impl SearchKind {
    fn label(self) -> &'static str {
        match self {
            Self::Images => "Image",
            Self::Videos => "Video",
            Self::News => "News",
            Self::Academic => "Academic",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DownloadKind {
    File,
    Image,
    Video,
}

impl DownloadKind {
    /// Required content-type prefix, if any.
    fn expected_type(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::File => None,
            Self::Image => Some(("image/", "an image")),
            Self::Video => Some(("video/", "a video")),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Image => "Image",
            Self::Video => "Video",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "FirstURL")]
    first_url: Option<String>,
}

pub struct WebHandler {
    client: Client,
    config: WebConfig,
}

impl WebHandler {
    pub fn new(config: WebConfig) -> Result<Self, HandlerError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn search_web(&self, p: WebParams) -> Result<ToolCallResult, HandlerError> {
        let query = require(p.query, "query")?;
        let url = Url::parse_with_params(
            &self.config.search_endpoint,
            &[
                ("q", query.as_str()),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ],
        )
        .map_err(|e| HandlerError::InvalidArgument(format!("search endpoint: {e}")))?;

        debug!("web search: {}", query);
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        // The endpoint answers with an empty body or non-JSON for some queries.
        let answer: InstantAnswer = serde_json::from_str(&body).unwrap_or_default();

        let mut lines = vec![format!("Search results for: {query}")];
        if !answer.answer.is_empty() {
            lines.push(answer.answer.clone());
        }
        if !answer.abstract_text.is_empty() {
            let heading = if answer.heading.is_empty() {
                String::new()
            } else {
                format!("{}: ", answer.heading)
            };
            lines.push(format!("{heading}{}", answer.abstract_text));
            if !answer.abstract_url.is_empty() {
                lines.push(format!("Source: {}", answer.abstract_url));
            }
        }
        let related: Vec<_> = answer
            .related_topics
            .iter()
            .filter_map(|t| Some((t.text.as_deref()?, t.first_url.as_deref().unwrap_or(""))))
            .take(MAX_RELATED_TOPICS)
            .collect();
        for (text, url) in &related {
            lines.push(format!("- {text} {url}").trim_end().to_string());
        }
        if lines.len() == 1 {
            lines.push("No instant answer available.".to_string());
        }

        let mut data = Map::new();
        data.insert("abstract".into(), json!(answer.abstract_text));
        data.insert(
            "related".into(),
            json!(related
                .iter()
                .map(|(text, url)| json!({"text": text, "url": url}))
                .collect::<Vec<_>>()),
        );
        Ok(ToolCallResult::success_with(lines.join("\n"), data))
    }

    fn search_link(&self, kind: SearchKind, p: WebParams) -> Result<ToolCallResult, HandlerError> {
        let query = require(p.query, "query")?;
        let params = match kind {
            SearchKind::Images => vec![("q", query.clone()), ("ia", "images".to_string())],
            SearchKind::Videos => vec![("q", query.clone()), ("ia", "videos".to_string())],
            SearchKind::News => vec![("q", query.clone()), ("ia", "news".to_string())],
            SearchKind::Academic => vec![(
                "q",
                format!("{query} site:arxiv.org OR site:scholar.archive.org"),
            )],
        };
        let url = Url::parse_with_params(&self.config.search_page, &params)
            .map_err(|e| HandlerError::InvalidArgument(format!("search page: {e}")))?;

        let mut data = Map::new();
        data.insert("url".into(), json!(url.as_str()));
        Ok(ToolCallResult::success_with(
            format!("{} search results for: {query}\n{url}", kind.label()),
            data,
        ))
    }

    async fn download(&self, kind: DownloadKind, p: WebParams) -> Result<ToolCallResult, HandlerError> {
        let url = require(p.url, "url")?;
        let path = require(p.path, "path")?;
        let url = Url::parse(&url)
            .map_err(|e| HandlerError::InvalidArgument(format!("invalid URL '{url}': {e}")))?;

        let mut response = self.client.get(url).send().await?.error_for_status()?;

        if let Some((prefix, noun)) = kind.expected_type() {
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if !content_type.starts_with(prefix) {
                return Ok(ToolCallResult::failure(format!(
                    "Error: URL does not point to {noun} (content-type: {content_type})"
                )));
            }
        }

        let target = Path::new(&path);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(HandlerError::io(format!("Error creating {}", parent.display())))?;
        }
        let context = format!("Error downloading {} to {path}", kind.label().to_lowercase());
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(HandlerError::io(context.clone()))?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(HandlerError::io(context.clone()))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(HandlerError::io(context))?;

        let mut data = Map::new();
        data.insert("bytes".into(), json!(written));
        data.insert("path".into(), json!(path));
        Ok(ToolCallResult::success_with(
            format!("{} downloaded successfully to {path}", kind.label()),
            data,
        ))
    }
}

#[async_trait]
impl CapabilityHandler for WebHandler {
    fn group(&self) -> OperationGroup {
        OperationGroup::Web
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let p = WebParams::from_args(params);
        match operation {
            "search_web" => self.search_web(p).await,
            "search_images" => self.search_link(SearchKind::Images, p),
            "search_videos" => self.search_link(SearchKind::Videos, p),
            "search_news" => self.search_link(SearchKind::News, p),
            "search_academic" => self.search_link(SearchKind::Academic, p),
            "download_file" => self.download(DownloadKind::File, p).await,
            "download_image" => self.download(DownloadKind::Image, p).await,
            "download_video" => self.download(DownloadKind::Video, p).await,
            other => Err(HandlerError::UnsupportedOperation(other.to_string())),
        }
    }
}
