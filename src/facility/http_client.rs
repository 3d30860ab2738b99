use super::loader::{FacilityError, FacilityLoader};
use super::types::{Airway, Facility};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Facility loader backed by a navdata HTTP service.
pub struct NavdataHttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl NavdataHttpClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FacilityError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FacilityError::NotFound);
        }
        if !response.status().is_success() {
            return Err(FacilityError::Unavailable);
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl FacilityLoader for NavdataHttpClient {
    async fn get_facility(&self, ident: &str) -> Result<Facility, FacilityError> {
        self.get_json(&format!("facilities/{ident}")).await
    }

    async fn get_airway(&self, name: &str) -> Result<Airway, FacilityError> {
        self.get_json(&format!("airways/{name}")).await
    }
}
