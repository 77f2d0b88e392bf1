//! Dataset discovery for providers that publish an index page instead of a
//! single dataset URL.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use storm_common::{ProviderSource, StormError, StormResult};

/// One dataset found on a provider's index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDataset {
    pub url: String,
    /// File name, used as the artifact label.
    pub label: String,
}

fn href_pattern() -> &'static Regex {
    static HREF: OnceLock<Regex> = OnceLock::new();
    HREF.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"'#?]+)["']"#).expect("Invalid href pattern")
    })
}

/// Links in `html` whose file name matches `pattern`, resolved against
/// `base` and de-duplicated in page order.
pub fn matching_links(base: &Url, html: &str, pattern: &Regex) -> Vec<DiscoveredDataset> {
    let mut found: Vec<DiscoveredDataset> = Vec::new();

    for capture in href_pattern().captures_iter(html) {
        let Ok(url) = base.join(&capture[1]) else {
            continue;
        };
        let Some(label) = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(String::from)
        else {
            continue;
        };

        if pattern.is_match(&label) && !found.iter().any(|d| d.url == url.as_str()) {
            found.push(DiscoveredDataset {
                url: url.to_string(),
                label,
            });
        }
    }

    found
}

/// Fetch the provider's index page and list the datasets its filename
/// pattern selects.
#[instrument(skip(client), fields(provider = %provider.name, url = %provider.url))]
pub async fn discover(client: &Client, provider: &ProviderSource) -> StormResult<Vec<DiscoveredDataset>> {
    let Some(expr) = provider.data_regex.as_deref() else {
        return Err(StormError::Configuration(format!(
            "Provider {} has no data regex to discover datasets with",
            provider.name
        )));
    };

    let pattern = Regex::new(expr).map_err(|e| {
        StormError::Configuration(format!("Provider {} has an invalid data regex: {}", provider.name, e))
    })?;
    let base = Url::parse(&provider.url)
        .map_err(|e| StormError::Configuration(format!("Provider {} url: {}", provider.name, e)))?;

    let html = client
        .get(base.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| StormError::Network(format!("Failed to list {}: {}", base, e)))?
        .text()
        .await
        .map_err(|e| StormError::Network(format!("Failed to read {}: {}", base, e)))?;

    let found = matching_links(&base, &html, &pattern);
    debug!(count = found.len(), "Discovered datasets");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"<html><body>
<a href="../">Parent</a>
<a href="42001h2017.txt.gz">42001h2017.txt.gz</a>
<a HREF='42002h2017.txt.gz'>42002h2017.txt.gz</a>
<a href="/data/historical/42003h2016.txt.gz">old</a>
<a href="42001h2017.txt.gz?download=1">dup with query</a>
<a href="https://mirror.example.org/data/42035h2017.txt.gz">mirror</a>
</body></html>"#;

    #[test]
    fn test_links_are_filtered_resolved_and_deduplicated() {
        let base = Url::parse("https://www.ndbc.example.org/data/historical/stdmet/").unwrap();
        let pattern = Regex::new(r"^\d{5}h2017\.txt\.gz$").unwrap();

        let found = matching_links(&base, INDEX, &pattern);
        let urls: Vec<&str> = found.iter().map(|d| d.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.ndbc.example.org/data/historical/stdmet/42001h2017.txt.gz",
                "https://www.ndbc.example.org/data/historical/stdmet/42002h2017.txt.gz",
                "https://mirror.example.org/data/42035h2017.txt.gz",
            ]
        );
        assert_eq!(found[0].label, "42001h2017.txt.gz");
    }
}
