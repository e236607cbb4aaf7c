use anyhow::{Context, Result, anyhow};
use check_updates_core::{PackageInfo, Version};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the PyPI JSON API
#[derive(Debug, Clone)]
pub struct PyPiClient {
    client: reqwest::Client,
    base_url: String,
    include_prerelease: bool,
    concurrency: usize,
}

/// PyPI JSON API response structure
#[derive(Debug, Deserialize)]
struct PyPiResponse {
    info: PyPiInfo,
    #[serde(default)]
    releases: HashMap<String, Vec<PyPiFile>>,
}

#[derive(Debug, Deserialize)]
struct PyPiInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PyPiFile {
    #[serde(default)]
    yanked: bool,
}

/// Result of fetching multiple packages
#[derive(Debug, Clone, Default)]
pub struct GetPackagesResult {
    pub packages: HashMap<String, PackageInfo>,
    pub errors: Vec<String>,
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("python-check-updates/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

impl PyPiClient {
    pub fn new(include_prerelease: bool) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            base_url: DEFAULT_INDEX_URL.to_string(),
            include_prerelease,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_index_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Maximum number of requests in flight
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Fetch package info from PyPI
    pub async fn get_package(&self, name: &str) -> Result<PackageInfo> {
        let url = format!("{}/{name}/json", self.base_url);
        tracing::debug!(%url, "fetching package");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch package '{name}'"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("Package '{name}' not found on PyPI"));
        }
        if !status.is_success() {
            return Err(anyhow!("PyPI API request failed with status: {status}"));
        }

        let data: PyPiResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response for '{name}'"))?;

        let available: Vec<Version> = data
            .releases
            .iter()
            // Releases without files or with every file yanked are gone
            .filter(|(_, files)| files.iter().any(|f| !f.yanked))
            .filter_map(|(raw, _)| match Version::from_str(raw) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::trace!(package = %name, version = %raw, "ignoring unparseable release");
                    None
                }
            })
            .collect();
        let has_prereleases = available.iter().any(Version::is_prerelease);
        let versions: Vec<Version> = available
            .into_iter()
            .filter(|v| self.include_prerelease || !v.is_prerelease())
            .collect();

        if versions.is_empty() && has_prereleases {
            return Err(anyhow!(
                "No stable versions found for package '{name}' (use --pre-release to include pre-releases)"
            ));
        }

        PackageInfo::from_versions(data.info.name, versions)
            .ok_or_else(|| anyhow!("No valid versions found for package '{name}'"))
    }

    /// Fetch multiple packages concurrently
    ///
    /// Individual failures are collected as `"name: message"` strings; this only
    /// errors when every fetch failed.
    pub async fn get_packages(
        &self,
        names: &[String],
        progress_callback: impl Fn(usize, usize) + Send + Sync + 'static,
    ) -> Result<GetPackagesResult> {
        let total = names.len();
        let progress_callback = Arc::new(progress_callback);
        let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let mut tasks = Vec::with_capacity(total);
        for name in names {
            let client = self.clone();
            let name = name.clone();
            let callback = Arc::clone(&progress_callback);
            let completed = Arc::clone(&completed);
            let semaphore = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let result = match semaphore.acquire().await {
                    Ok(_permit) => client.get_package(&name).await,
                    Err(e) => Err(anyhow!("request pool closed: {e}")),
                };
                let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                callback(done, total);
                (name, result)
            }));
        }

        let mut result = GetPackagesResult::default();
        for task in tasks {
            match task.await {
                Ok((name, Ok(info))) => {
                    result.packages.insert(name, info);
                }
                Ok((name, Err(e))) => {
                    tracing::warn!(package = %name, error = %e, "failed to fetch package");
                    result.errors.push(format!("{name}: {e}"));
                }
                Err(e) => result.errors.push(format!("unknown: Task failed: {e}")),
            }
        }

        if result.packages.is_empty() && !result.errors.is_empty() {
            return Err(anyhow!(
                "Failed to fetch all packages:\n{}",
                result.errors.join("\n")
            ));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn release(yanked: bool) -> serde_json::Value {
        json!([{ "filename": "pkg.whl", "yanked": yanked }])
    }

    async fn mount_package(server: &MockServer, name: &str, releases: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/pypi/{name}/json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "info": { "name": name },
                "releases": releases,
            })))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer, pre: bool) -> PyPiClient {
        PyPiClient::new(pre).with_index_url(&format!("{}/pypi/", server.uri()))
    }

    #[tokio::test]
    async fn test_get_package_filters_yanked_and_empty() {
        let server = MockServer::start().await;
        mount_package(
            &server,
            "requests",
            json!({
                "2.30.0": release(false),
                "2.31.0": release(false),
                "2.32.0": release(true),
                "2.33.0": [],
                "3.0.0b1": release(false),
                "garbage": release(false),
            }),
        )
        .await;

        let info = client(&server, false).get_package("requests").await.unwrap();
        let versions: Vec<String> = info.versions.iter().map(ToString::to_string).collect();
        assert_eq!(versions, ["2.30.0", "2.31.0"]);
        assert_eq!(info.latest.to_string(), "2.31.0");
        assert_eq!(info.latest_stable.unwrap().to_string(), "2.31.0");
    }

    #[tokio::test]
    async fn test_get_package_with_prereleases() {
        let server = MockServer::start().await;
        mount_package(
            &server,
            "django",
            json!({ "5.0.0": release(false), "5.1a1": release(false) }),
        )
        .await;

        let info = client(&server, true).get_package("django").await.unwrap();
        assert_eq!(info.latest.to_string(), "5.1a1");
        assert_eq!(info.latest_stable.unwrap().to_string(), "5.0.0");
    }

    #[tokio::test]
    async fn test_only_prereleases_hints_flag() {
        let server = MockServer::start().await;
        mount_package(&server, "newpkg", json!({ "0.1.0rc1": release(false) })).await;

        let err = client(&server, false).get_package("newpkg").await.unwrap_err();
        assert!(err.to_string().contains("--pre-release"));
    }

    #[tokio::test]
    async fn test_all_yanked_does_not_hint_flag() {
        let server = MockServer::start().await;
        mount_package(
            &server,
            "withdrawn",
            json!({ "1.0.0": release(true), "1.1.0": release(true) }),
        )
        .await;

        let err = client(&server, false).get_package("withdrawn").await.unwrap_err();
        assert!(err.to_string().contains("No valid versions"));
        assert!(!err.to_string().contains("--pre-release"));
    }

    #[tokio::test]
    async fn test_get_package_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server, false).get_package("missing").await.unwrap_err();
        assert!(err.to_string().contains("not found on PyPI"));
    }

    #[tokio::test]
    async fn test_get_packages_partial_failure() {
        let server = MockServer::start().await;
        mount_package(&server, "flask", json!({ "3.0.0": release(false) })).await;
        Mock::given(method("GET"))
            .and(path("/pypi/missing/json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let names = vec!["flask".to_string(), "missing".to_string()];
        let result = client(&server, false)
            .with_concurrency(1)
            .get_packages(&names, move |_, total| {
                assert_eq!(total, 2);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(result.packages.contains_key("flask"));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("missing: "));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_packages_all_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let names = vec!["a".to_string(), "b".to_string()];
        let err = client(&server, false)
            .get_packages(&names, |_, _| {})
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to fetch all packages"));
    }

    #[test]
    fn test_custom_index_url() {
        let client = PyPiClient::new(false).with_index_url("https://example.org/pypi/");
        assert_eq!(client.base_url, "https://example.org/pypi");
    }
}
