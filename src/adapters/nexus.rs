use crate::domain::model::Component;
use crate::utils::error::{ConstructorError, Result};
use reqwest::{Client, Response};
use serde::Deserialize;

pub const COMPONENTS_PATH: &str = "/service/rest/v1/components";
pub const REPOSITORIES_PATH: &str = "/service/rest/v1/repositories";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: "cachito".to_string(),
            password: "cachito".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComponentPage {
    #[serde(default)]
    items: Vec<Component>,
    #[serde(default)]
    continuation_token: Option<String>,
}

/// Sonatype Nexus REST client, basic-auth protected.
#[derive(Debug, Clone)]
pub struct NexusClient {
    base_url: String,
    credentials: Credentials,
    client: Client,
}

impl NexusClient {
    pub fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Response> {
        tracing::debug!("Nexus request: GET {}", url);
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ConstructorError::NexusError {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    pub async fn list_repositories(&self) -> Result<Vec<serde_json::Value>> {
        let url = self.url(REPOSITORIES_PATH);
        Ok(self.get(&url, &[]).await?.json().await?)
    }

    pub async fn describe_repository(&self, name: &str) -> Result<serde_json::Value> {
        let url = format!("{}/{}/", self.url(REPOSITORIES_PATH), name);
        Ok(self.get(&url, &[]).await?.json().await?)
    }

    /// Every component of `repository`, following continuation tokens until
    /// a page comes back without one.
    pub async fn list_components(&self, repository: &str) -> Result<Vec<Component>> {
        let url = self.url(COMPONENTS_PATH);
        let mut components = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut query = vec![("repository", repository)];
            if let Some(token) = token.as_deref() {
                query.push(("continuationToken", token));
            }

            let page: ComponentPage = self.get(&url, &query).await?.json().await?;
            tracing::debug!(
                "Fetched {} components from '{}'",
                page.items.len(),
                repository
            );
            components.extend(page.items);

            match page.continuation_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(components)
    }
}
