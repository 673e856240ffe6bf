//! Site list file: one domain or URL per line.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

/// Normalize one line to an absolute `https://` URL.
///
/// Blank lines and `#` comments yield `None`. `http://` is upgraded and bare
/// domains get a scheme.
pub fn normalize_site(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let url = if line.starts_with("https://") {
        line.to_string()
    } else if let Some(rest) = line.strip_prefix("http://") {
        format!("https://{rest}")
    } else {
        format!("https://{line}")
    };
    Some(url)
}

/// Parse file contents, dropping entries that still aren't valid URLs.
pub fn parse_site_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(normalize_site)
        .filter(|site| match url::Url::parse(site) {
            Ok(u) if u.host_str().is_some() => true,
            _ => {
                warn!(site = %site, "Skipping malformed site list entry");
                false
            }
        })
        .collect()
}

/// Read and parse the site list. A missing file or an empty list is fatal.
pub async fn load_site_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        bail!("Site list file not found at {}", path.display());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read site list: {}", path.display()))?;

    let sites = parse_site_list(&content);
    if sites.is_empty() {
        bail!("Site list {} contains no sites", path.display());
    }
    info!(path = %path.display(), count = sites.len(), "Loaded site list");
    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_schemes() {
        assert_eq!(normalize_site("https://a.example").as_deref(), Some("https://a.example"));
        assert_eq!(normalize_site("http://b.example/x").as_deref(), Some("https://b.example/x"));
        assert_eq!(normalize_site("  c.example  ").as_deref(), Some("https://c.example"));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let sites = parse_site_list("a.example\n\n   \n# top sites\nhttp://b.example\r\n");
        assert_eq!(sites, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn drops_unparseable_entries() {
        let sites = parse_site_list("good.example\nbad host with spaces\n");
        assert_eq!(sites, vec!["https://good.example"]);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = load_site_list(Path::new("/no/such/sites.txt")).await.unwrap_err();
        assert!(err.to_string().contains("Site list file not found"));
    }

    #[tokio::test]
    async fn empty_list_is_fatal() {
        let path = std::env::temp_dir().join(format!("vendorscope-empty-{}.txt", std::process::id()));
        tokio::fs::write(&path, "# nothing here\n\n").await.unwrap();
        let err = load_site_list(&path).await.unwrap_err();
        let _ = tokio::fs::remove_file(&path).await;
        assert!(err.to_string().contains("contains no sites"));
    }
}
