//! HTTP transport for queued mutations.

use std::future::Future;
use std::time::Duration;

use tally_engine::{ApiError, Method, MutationApi, MutationRequest, MutationResponse};

use crate::error::Result;

/// Sends mutations to the REST API with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpMutationApi {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpMutationApi {
    pub fn new(base_url: &str, timeout: Duration, auth_token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(e.to_string())
    }
}

impl MutationApi for HttpMutationApi {
    fn send(
        &self,
        request: MutationRequest,
    ) -> impl Future<Output = std::result::Result<MutationResponse, ApiError>> + Send {
        let client = self.client.clone();
        let url = self.url(&request.path);
        let auth_token = self.auth_token.clone();

        async move {
            let mut builder = client
                .request(http_method(request.method), &url)
                .header(reqwest::header::ACCEPT, "application/json");
            for (name, value) in request.meta.headers() {
                builder = builder.header(name, value);
            }
            if let Some(token) = &auth_token {
                builder = builder.bearer_auth(token);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();
            let text = response.text().await.map_err(transport_error)?;

            if !status.is_success() {
                tracing::debug!(status = status.as_u16(), url = %url, "Mutation rejected");
                return Err(ApiError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }

            // Bodies are optional; a 204 or a non-JSON ack is still a success
            let body = serde_json::from_str(&text).ok();
            Ok(MutationResponse::new(status.as_u16(), body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_base_url() {
        let api = HttpMutationApi::new("http://localhost:3000/api/", Duration::from_secs(1), None)
            .unwrap();
        assert_eq!(api.base_url(), "http://localhost:3000/api");
        assert_eq!(api.url("/expenses/7"), "http://localhost:3000/api/expenses/7");
    }

    #[test]
    fn maps_methods() {
        assert_eq!(http_method(Method::Post), reqwest::Method::POST);
        assert_eq!(http_method(Method::Patch), reqwest::Method::PATCH);
        assert_eq!(http_method(Method::Delete), reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let api =
            HttpMutationApi::new("http://127.0.0.1:9", Duration::from_secs(2), None).unwrap();
        let op = tally_engine::Operation::delete(
            "op-1",
            "device-1",
            tally_engine::EntityKind::Expense,
            "1",
            1000,
        );
        let request = MutationRequest::for_operation(&op).unwrap();

        let result = api.send(request).await;
        assert!(matches!(
            result,
            Err(ApiError::Network(_)) | Err(ApiError::Timeout)
        ));
    }
}
