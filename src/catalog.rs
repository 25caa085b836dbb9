use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/w500";
const YOUTUBE_EMBED_BASE: &str = "https://www.youtube.com/embed/";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Catalog answered with status {0}")]
    Status(u16),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MovieSummary {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Genre {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MovieDetails {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Third-party movie metadata source.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn discover(&self, page: u32) -> Result<Vec<MovieSummary>, CatalogError>;
    async fn search(&self, query: &str, page: u32) -> Result<Vec<MovieSummary>, CatalogError>;
    /// `Ok(None)` when the catalog does not know the movie.
    async fn details(&self, id: u64) -> Result<Option<MovieDetails>, CatalogError>;
    async fn videos(&self, id: u64) -> Result<Vec<Video>, CatalogError>;
    async fn recommendations(&self, id: u64) -> Result<Vec<MovieSummary>, CatalogError>;
}

pub fn poster_url(poster_path: Option<&str>) -> Option<String> {
    poster_path.map(|path| format!("{}{}", TMDB_IMAGE_BASE, path))
}

/// First YouTube trailer in the catalog's video list.
pub fn trailer_key(videos: &[Video]) -> Option<&str> {
    videos
        .iter()
        .find(|video| video.kind == "Trailer" && video.site == "YouTube")
        .map(|video| video.key.as_str())
}

pub fn youtube_embed_url(key: &str) -> String {
    format!("{}{}", YOUTUBE_EMBED_BASE, key)
}

/// The Movie Database (TMDB) v3 client.
pub struct Tmdb {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl Tmdb {
    pub fn new(
        base_url: &str,
        api_key: &str,
        language: &str,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Tmdb {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            language: language.to_owned(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, CatalogError> {
        debug!("TMDB GET {} {:?}", path, params);
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("api_key", &self.api_key), ("language", &self.language)])
            .query(params)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(CatalogError::Status(status.as_u16())),
        }
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, CatalogError> {
        Ok(self
            .get::<Page<T>>(path, params)
            .await?
            .map(|page| page.results)
            .unwrap_or_default())
    }
}

#[async_trait]
impl Catalog for Tmdb {
    async fn discover(&self, page: u32) -> Result<Vec<MovieSummary>, CatalogError> {
        self.get_page("/discover/movie", &[("page", page.to_string())])
            .await
    }

    async fn search(&self, query: &str, page: u32) -> Result<Vec<MovieSummary>, CatalogError> {
        self.get_page(
            "/search/movie",
            &[("query", query.to_owned()), ("page", page.to_string())],
        )
        .await
    }

    async fn details(&self, id: u64) -> Result<Option<MovieDetails>, CatalogError> {
        self.get(&format!("/movie/{}", id), &[]).await
    }

    async fn videos(&self, id: u64) -> Result<Vec<Video>, CatalogError> {
        self.get_page(&format!("/movie/{}/videos", id), &[]).await
    }

    async fn recommendations(&self, id: u64) -> Result<Vec<MovieSummary>, CatalogError> {
        self.get_page(&format!("/movie/{}/recommendations", id), &[])
            .await
    }
}
