//! Web search tool
//!
//! Queries the DuckDuckGo HTML endpoint, so no API key is needed. Only the
//! delegated search agent gets this tool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::core::{NetpilotError, ParamType, Result, ToolSpec};
use crate::tools::registry::{required_str, ToolArgs, ToolHandler, ToolRegistry};

const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; netpilot/", env!("CARGO_PKG_VERSION"), ")");

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// `web_search(query)`
pub struct WebSearch {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(endpoint: impl Into<String>, max_results: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            max_results,
        })
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            "web_search",
            "Performs a web search for the query and returns the top results with title, snippet and URL.",
        )
        .param("query", ParamType::String, "The search query to perform")
    }

    /// Register `web_search` in `registry`
    pub fn register(self, registry: &mut ToolRegistry) -> Result<()> {
        registry.register(Self::spec(), Arc::new(self))
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = Url::parse_with_params(&self.endpoint, &[("q", query)])
            .map_err(|e| NetpilotError::config(format!("invalid search endpoint: {}", e)))?;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NetpilotError::tool(format!(
                "search request failed with status {}",
                response.status()
            )));
        }
        let html = response.text().await?;
        Ok(extract_ddg_results(&html, self.max_results))
    }
}

#[async_trait]
impl ToolHandler for WebSearch {
    fn parameters(&self) -> Vec<String> {
        vec!["query".to_string()]
    }

    async fn call(&self, args: ToolArgs) -> Result<Value> {
        let query = required_str(&args, "query")?;
        let results = self.search(query).await?;
        tracing::debug!(query, hits = results.len(), "web search");

        if results.is_empty() {
            return Ok(Value::String(format!("No results found for: {}", query)));
        }
        let rendered: Vec<String> = results
            .iter()
            .map(|r| format!("## {}\n{}\nURL: {}", r.title, r.snippet, r.url))
            .collect();
        Ok(Value::String(format!(
            "## Search Results\n\n{}",
            rendered.join("\n\n")
        )))
    }
}

/// Text content of the first element with `class="{class}"` in `chunk`
fn field(chunk: &str, class: &str) -> Option<String> {
    let rest = chunk.split(&format!("class=\"{}\"", class)).nth(1)?;
    let (_, body) = rest.split_once('>')?;
    let inner = body.split("</a>").next().unwrap_or(body);
    Some(strip_tags(inner).trim().to_string())
}

/// Drop inline markup such as the `<b>` DuckDuckGo puts around matches
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Pull results out of the DuckDuckGo HTML page
fn extract_ddg_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    html.split("result__body")
        .skip(1)
        .filter_map(|chunk| {
            let title = field(chunk, "result__a").filter(|t| !t.is_empty())?;
            Some(SearchResult {
                title: html_decode(&title),
                snippet: html_decode(&field(chunk, "result__snippet").unwrap_or_default()),
                url: field(chunk, "result__url").unwrap_or_default(),
            })
        })
        .take(max_results)
        .collect()
}

fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result results_links">
  <div class="links_main links_deep result__body">
    <h2 class="result__title"><a rel="nofollow" class="result__a" href="https://x">OSPF &amp; EIGRP on IOS</a></h2>
    <a class="result__url" href="https://x"> www.cisco.com/ospf </a>
    <a class="result__snippet" href="https://x">Configure <b>OSPF</b> &quot;areas&quot;</a>
  </div>
</div>
<div class="result results_links">
  <div class="links_main links_deep result__body">
    <h2 class="result__title"><a rel="nofollow" class="result__a" href="https://y">Second</a></h2>
    <a class="result__url" href="https://y">example.org</a>
  </div>
</div>
<div class="result results_links">
  <div class="links_main links_deep result__body">
    <h2 class="result__title"><a rel="nofollow" class="result__a" href="https://z">Third</a></h2>
  </div>
</div>
"#;

    #[test]
    fn test_extract_results() {
        let results = extract_ddg_results(PAGE, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "OSPF & EIGRP on IOS");
        assert_eq!(results[0].snippet, "Configure OSPF \"areas\"");
        assert_eq!(results[0].url, "www.cisco.com/ospf");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_extract_respects_max_results() {
        assert_eq!(extract_ddg_results(PAGE, 2).len(), 2);
        assert!(extract_ddg_results("<html></html>", 5).is_empty());
    }

    #[test]
    fn test_html_decode_order() {
        assert_eq!(html_decode("&amp;lt;"), "&lt;");
        assert_eq!(html_decode("a &amp; b"), "a & b");
    }

    #[test]
    fn test_schema_and_params_agree() {
        let search = WebSearch::new("https://html.duckduckgo.com/html/", 5).unwrap();
        assert_eq!(WebSearch::spec().parameter_names(), search.parameters());
    }
}
