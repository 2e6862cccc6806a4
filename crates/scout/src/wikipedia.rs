//! The external knowledge source behind the researcher's tools.
//!
//! Both operations are pure read-only lookups against the MediaWiki API and
//! are safe to retry. Failures never escape `WikipediaToolkit::dispatch`:
//! they are normalized into descriptive result strings so a flaky lookup
//! can never abort a research run.

use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::tool::{Tool, ToolCall};
use crate::toolkit::{Toolkit, ToolOutcome};

pub const WIKIPEDIA_HOST: &str = "https://en.wikipedia.org";

/// Candidates returned per search
pub const SEARCH_LIMIT: usize = 5;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// One search candidate: an article title plus a markup-free snippet
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

pub struct WikipediaClient {
    client: Client,
    host: String,
}

impl WikipediaClient {
    pub fn new() -> Result<Self> {
        Self::with_host(WIKIPEDIA_HOST)
    }

    pub fn with_host<S: Into<String>>(host: S) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            host: host.into(),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/w/api.php", self.host.trim_end_matches('/'))
    }

    /// Full-text search, up to [`SEARCH_LIMIT`] candidates
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let limit = SEARCH_LIMIT.to_string();
        let response: Value = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let hits = response["query"]["search"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .filter_map(|result| {
                        let title = result.get("title")?.as_str()?.to_string();
                        let snippet = result
                            .get("snippet")
                            .and_then(|s| s.as_str())
                            .map(strip_markup)
                            .unwrap_or_default();
                        Some(SearchHit { title, snippet })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }

    /// Plain-text intro extract for an exact title, or None if no such
    /// article exists
    pub async fn fetch_summary(&self, title: &str) -> Result<Option<String>> {
        let response: Value = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let pages = match response["query"]["pages"].as_object() {
            Some(pages) => pages,
            None => return Ok(None),
        };

        for page in pages.values() {
            if page.get("missing").is_some() {
                continue;
            }
            if let Some(extract) = page.get("extract").and_then(|e| e.as_str()) {
                let extract = extract.trim();
                if !extract.is_empty() {
                    return Ok(Some(extract.to_string()));
                }
            }
        }
        Ok(None)
    }
}

/// Strip HTML tags and unescape the entities MediaWiki leaves in snippets
fn strip_markup(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, "");
    stripped
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// The two read-only tools exposed to the researcher role
pub struct WikipediaToolkit {
    client: WikipediaClient,
    tools: Vec<Tool>,
}

impl WikipediaToolkit {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(WikipediaClient::new()?))
    }

    pub fn with_client(client: WikipediaClient) -> Self {
        let search_tool = Tool::new(
            "search",
            "Search the encyclopedia for articles matching a query. \
             Returns up to five candidates with a title and a snippet.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search phrase, e.g. a topic name."
                    }
                }
            }),
        );

        let fetch_tool = Tool::new(
            "fetch_article",
            "Fetch the introduction of an article by its exact title, \
             as returned by the search tool.",
            json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "The exact article title to fetch."
                    }
                }
            }),
        );

        Self {
            client,
            tools: vec![search_tool, fetch_tool],
        }
    }

    fn argument<'a>(call: &'a ToolCall, name: &str) -> &'a str {
        call.arguments
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
    }

    async fn search(&self, call: &ToolCall) -> ToolOutcome {
        let query = Self::argument(call, "query");
        if query.is_empty() {
            return ToolOutcome::text("The search tool requires a non-empty \"query\" argument.");
        }

        match self.client.search(query).await {
            Ok(hits) if hits.is_empty() => {
                ToolOutcome::counted(format!("No search results for \"{}\".", query), 0)
            }
            Ok(hits) => {
                let count = hits.len();
                let listing = hits
                    .iter()
                    .enumerate()
                    .map(|(i, hit)| format!("{}. {} — {}", i + 1, hit.title, hit.snippet))
                    .collect::<Vec<_>>()
                    .join("\n");
                ToolOutcome::counted(listing, count)
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "search lookup failed");
                ToolOutcome::text(format!(
                    "Search is currently unavailable ({}). Proceed with what you already have.",
                    e
                ))
            }
        }
    }

    async fn fetch_article(&self, call: &ToolCall) -> ToolOutcome {
        let title = Self::argument(call, "title");
        if title.is_empty() {
            return ToolOutcome::text(
                "The fetch_article tool requires a non-empty \"title\" argument.",
            );
        }

        match self.client.fetch_summary(title).await {
            Ok(Some(summary)) => ToolOutcome::text(summary),
            Ok(None) => ToolOutcome::text(format!(
                "No article found with the exact title \"{}\".",
                title
            )),
            Err(e) => {
                tracing::warn!(title, error = %e, "article lookup failed");
                ToolOutcome::text(format!(
                    "The article \"{}\" could not be retrieved ({}).",
                    title, e
                ))
            }
        }
    }
}

#[async_trait]
impl Toolkit for WikipediaToolkit {
    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn dispatch(&self, call: ToolCall) -> ToolOutcome {
        match call.name.as_str() {
            "search" => self.search(&call).await,
            "fetch_article" => self.fetch_article(&call).await,
            other => ToolOutcome::text(format!("Unknown tool: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_strip_markup() {
        let snippet = "The <span class=\"searchmatch\">Rust</span> language &amp; its &quot;borrow checker&quot;";
        assert_eq!(
            strip_markup(snippet),
            "The Rust language & its \"borrow checker\""
        );
    }

    async fn toolkit_for(server: &MockServer) -> WikipediaToolkit {
        WikipediaToolkit::with_client(WikipediaClient::with_host(server.uri()).unwrap())
    }

    #[tokio::test]
    async fn test_search_returns_stripped_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {
                    "search": [
                        {"title": "Rust (programming language)", "snippet": "<span>Rust</span> is a language"},
                        {"title": "Rust Belt", "snippet": "region of the United States"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("search", json!({"query": "rust"})))
            .await;

        assert_eq!(outcome.count, Some(2));
        assert!(outcome.content.starts_with("1. Rust (programming language) — Rust is a language"));
        assert!(outcome.content.contains("2. Rust Belt"));
    }

    #[tokio::test]
    async fn test_fetch_article_missing_title_is_not_found_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {
                    "pages": {
                        "-1": {"title": "No Such Article", "missing": ""}
                    }
                }
            })))
            .mount(&server)
            .await;

        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("fetch_article", json!({"title": "No Such Article"})))
            .await;

        assert_eq!(
            outcome.content,
            "No article found with the exact title \"No Such Article\"."
        );
        assert_eq!(outcome.count, None);
    }

    #[tokio::test]
    async fn test_fetch_article_returns_extract() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "extracts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {
                    "pages": {
                        "42": {"title": "Rust", "extract": "Rust is a systems language."}
                    }
                }
            })))
            .mount(&server)
            .await;

        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("fetch_article", json!({"title": "Rust"})))
            .await;

        assert_eq!(outcome.content, "Rust is a systems language.");
    }

    #[tokio::test]
    async fn test_unreachable_source_becomes_fallback_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("search", json!({"query": "rust"})))
            .await;

        assert!(outcome.content.contains("Search is currently unavailable"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_fallback_text() {
        let server = MockServer::start().await;
        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("delete_article", json!({})))
            .await;

        assert_eq!(outcome.content, "Unknown tool: delete_article");
    }

    #[tokio::test]
    async fn test_empty_results_report_zero_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"search": []}
            })))
            .mount(&server)
            .await;

        let toolkit = toolkit_for(&server).await;
        let outcome = toolkit
            .dispatch(ToolCall::new("search", json!({"query": "zzzz"})))
            .await;

        assert_eq!(outcome.count, Some(0));
        assert!(outcome.content.contains("No search results"));
    }
}
