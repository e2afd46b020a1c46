use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{MetadataProvider, ProviderError};
use crate::media::VideoDetails;

const OMDB_API_BASE: &str = "https://www.omdbapi.com/";

/// Metadata provider backed by the OMDb HTTP API.
pub struct OmdbProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OmdbProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, OMDB_API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: Client::new(),
        }
    }

    /// Normalize a file-derived title for searching: lowercase, special
    /// characters replaced with spaces.
    fn clean_title(title: &str) -> String {
        let cleaned: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
            .collect();
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error")]
    error: Option<String>,
    #[serde(rename = "Plot")]
    plot: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "Director")]
    director: Option<String>,
    #[serde(rename = "Actors")]
    actors: Option<String>,
    #[serde(rename = "Genre")]
    genre: Option<String>,
    #[serde(rename = "Poster")]
    poster: Option<String>,
}

/// OMDb uses the literal string "N/A" for absent fields.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty() && value != "N/A")
}

#[async_trait]
impl MetadataProvider for OmdbProvider {
    async fn lookup(&self, title: &str) -> Result<VideoDetails, ProviderError> {
        let query = Self::clean_title(title);
        debug!(title, query, "looking up metadata via OMDb");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", self.api_key.as_str()), ("t", query.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let body: OmdbResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if !body.response.eq_ignore_ascii_case("true") {
            return match body.error {
                Some(message) if message.contains("not found") => Err(ProviderError::NotFound),
                Some(message) => Err(ProviderError::Api(message)),
                None => Err(ProviderError::NotFound),
            };
        }

        Ok(VideoDetails {
            plot: present(body.plot),
            year: present(body.year),
            rating: present(body.imdb_rating),
            director: present(body.director),
            actors: present(body.actors),
            genre: present(body.genre),
            poster: present(body.poster),
        })
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}
