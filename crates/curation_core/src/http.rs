use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Container, ContainerId, Item, ItemId},
    error::ApiError,
    protocol::{ItemQuery, UpdateMembersRequest},
};
use url::Url;

use crate::{config::Settings, error::ServiceError, ContainerService, ItemService};

/// Talks to the admin API. One value serves one container type: `containers_path` and
/// `items_path` pick the REST collections (`sections`/`songs`, `categories`/`audio`, ...).
#[derive(Clone)]
pub struct HttpCurationApi {
    http: Client,
    base_url: Url,
    containers_path: String,
    items_path: String,
}

impl HttpCurationApi {
    pub fn new(
        http: Client,
        base_url: Url,
        containers_path: impl Into<String>,
        items_path: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            containers_path: containers_path.into(),
            items_path: items_path.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self::new(
            http,
            settings.api_base_url()?,
            settings.containers_path.clone(),
            settings.items_path.clone(),
        ))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ServiceError::Transport(format!("unusable base url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn read_json<T: DeserializeOwned>(
    response: Response,
    not_found: impl FnOnce() -> ServiceError,
) -> Result<T, ServiceError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(not_found());
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ApiError>(&body) {
            Ok(api_error) => ServiceError::Rejected {
                status: status.as_u16(),
                code: Some(api_error.code),
                message: api_error.message,
            },
            Err(_) => ServiceError::Rejected {
                status: status.as_u16(),
                code: None,
                message: if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body
                },
            },
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ServiceError::Decode(err.to_string()))
}

#[async_trait]
impl ContainerService for HttpCurationApi {
    async fn get(&self, container_id: &ContainerId) -> Result<Container, ServiceError> {
        let url = self.endpoint(&[self.containers_path.as_str(), container_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        read_json(response, || ServiceError::container_not_found(container_id)).await
    }

    async fn update(
        &self,
        container_id: &ContainerId,
        member_ids: &[ItemId],
    ) -> Result<Container, ServiceError> {
        let url = self.endpoint(&[
            self.containers_path.as_str(),
            container_id.as_str(),
            "members",
        ])?;
        let response = self
            .http
            .put(url)
            .json(&UpdateMembersRequest {
                member_ids: member_ids.to_vec(),
            })
            .send()
            .await?;
        read_json(response, || ServiceError::container_not_found(container_id)).await
    }
}

#[async_trait]
impl ItemService for HttpCurationApi {
    async fn get_by_id(&self, item_id: &ItemId) -> Result<Item, ServiceError> {
        let url = self.endpoint(&[self.items_path.as_str(), item_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        read_json(response, || ServiceError::item_not_found(item_id)).await
    }

    async fn get_all(&self, query: &ItemQuery) -> Result<Vec<Item>, ServiceError> {
        let url = self.endpoint(&[self.items_path.as_str()])?;
        let response = self.http.get(url).query(query).send().await?;
        read_json(response, || ServiceError::NotFound {
            resource: "item collection",
            id: self.items_path.clone(),
        })
        .await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
