//! Stock images for the `meta` section.
//!
//! Image search is best effort: a failure here never touches completeness,
//! the document just ships without pictures.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

const PEXELS_URL: &str = "https://api.pexels.com/v1/search";
const UNSPLASH_SOURCE: &str = "https://source.unsplash.com/800x600/";

/// Keyless URLs are generated from a fixed set of term variations.
const MAX_SOURCE_IMAGES: usize = 3;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image search returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("image search request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("image search response malformed: {0}")]
    Malformed(String),
}

/// `fetch_images(query, count)`.
#[allow(async_fn_in_trait)]
pub trait ImageSearch {
    async fn fetch_images(&self, query: &str, count: usize) -> Result<Vec<String>, ImageError>;
}

impl<T: ImageSearch> ImageSearch for &T {
    async fn fetch_images(&self, query: &str, count: usize) -> Result<Vec<String>, ImageError> {
        (**self).fetch_images(query, count).await
    }
}

/// Run a search and degrade any failure to an empty list.
pub async fn fetch_or_empty<I: ImageSearch>(search: &I, query: &str, count: usize) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    match search.fetch_images(query, count).await {
        Ok(urls) => {
            info!(query, found = urls.len(), "images retrieved");
            urls
        }
        Err(e) => {
            warn!(query, error = %e, "image search failed, continuing without images");
            Vec::new()
        }
    }
}

/// Pexels photo search, used when `PEXELS_API_KEY` is set.
pub struct PexelsClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl PexelsClient {
    pub fn new(api_key: String) -> Result<Self, ImageError> {
        Self::with_base_url(api_key, PEXELS_URL.to_string())
    }

    /// Create a client pointing at a custom search URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ImageError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url,
        })
    }
}

impl ImageSearch for PexelsClient {
    async fn fetch_images(&self, query: &str, count: usize) -> Result<Vec<String>, ImageError> {
        let per_page = count.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .header("Authorization", &self.api_key)
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ImageError::Api {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        let body = response
            .json::<PexelsResponse>()
            .await
            .map_err(|e| ImageError::Malformed(e.to_string()))?;
        Ok(body
            .photos
            .into_iter()
            .map(|p| p.src.large)
            .filter(|url| !url.is_empty())
            .take(count)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct PexelsResponse {
    #[serde(default)]
    photos: Vec<PexelsPhoto>,
}

#[derive(Debug, Deserialize)]
struct PexelsPhoto {
    src: PexelsSrc,
}

#[derive(Debug, Deserialize)]
struct PexelsSrc {
    #[serde(default)]
    large: String,
}

/// Keyless fallback: Unsplash source URLs built from search-term variations.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsplashSource;

impl ImageSearch for UnsplashSource {
    async fn fetch_images(&self, query: &str, count: usize) -> Result<Vec<String>, ImageError> {
        let urls: Vec<String> = search_terms(query)
            .into_iter()
            .take(count.min(MAX_SOURCE_IMAGES))
            .enumerate()
            .map(|(i, term)| format!("{UNSPLASH_SOURCE}?{term}&sig={i}"))
            .collect();
        debug!(query, urls = urls.len(), "generated source image URLs");
        Ok(urls)
    }
}

/// `bike sharing` -> `bike,sharing`, `bike,sharing,urban`, ...
pub fn search_terms(measure: &str) -> Vec<String> {
    let base = measure
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(",");
    vec![
        base.clone(),
        format!("{base},urban"),
        format!("{base},city"),
        format!("{base},sustainable,transport"),
        format!("{base},mobility"),
    ]
}

/// The image backend selected by configuration.
pub enum ImageSource {
    Pexels(PexelsClient),
    Unsplash(UnsplashSource),
}

impl ImageSource {
    /// Pexels when a key is configured, the keyless generator otherwise.
    pub fn from_key(api_key: Option<&str>) -> Result<Self, ImageError> {
        match api_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Ok(ImageSource::Pexels(PexelsClient::new(key.to_string())?)),
            None => Ok(ImageSource::Unsplash(UnsplashSource)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageSource::Pexels(_) => "pexels",
            ImageSource::Unsplash(_) => "unsplash-source",
        }
    }
}

impl ImageSearch for ImageSource {
    async fn fetch_images(&self, query: &str, count: usize) -> Result<Vec<String>, ImageError> {
        match self {
            ImageSource::Pexels(c) => c.fetch_images(query, count).await,
            ImageSource::Unsplash(c) => c.fetch_images(query, count).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl ImageSearch for Broken {
        async fn fetch_images(&self, _query: &str, _count: usize) -> Result<Vec<String>, ImageError> {
            Err(ImageError::Api {
                status: 403,
                message: "forbidden".into(),
            })
        }
    }

    #[test]
    fn search_term_variations() {
        assert_eq!(
            search_terms("Bike  Sharing"),
            vec![
                "bike,sharing",
                "bike,sharing,urban",
                "bike,sharing,city",
                "bike,sharing,sustainable,transport",
                "bike,sharing,mobility",
            ]
        );
    }

    #[tokio::test]
    async fn unsplash_urls_are_capped() {
        let urls = UnsplashSource.fetch_images("Car Pooling", 10).await.unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "https://source.unsplash.com/800x600/?car,pooling&sig=0");
        assert_eq!(urls[2], "https://source.unsplash.com/800x600/?car,pooling,city&sig=2");
    }

    #[tokio::test]
    async fn failures_degrade_to_empty() {
        assert!(fetch_or_empty(&Broken, "bike sharing", 3).await.is_empty());
    }

    #[tokio::test]
    async fn zero_count_skips_search() {
        assert!(fetch_or_empty(&UnsplashSource, "bike sharing", 0).await.is_empty());
    }

    #[test]
    fn source_selection_by_key() {
        assert_eq!(ImageSource::from_key(None).unwrap().name(), "unsplash-source");
        assert_eq!(ImageSource::from_key(Some("  ")).unwrap().name(), "unsplash-source");
        assert_eq!(ImageSource::from_key(Some("k")).unwrap().name(), "pexels");
    }
}
