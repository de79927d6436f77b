use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Result, StoreError};
use crate::config::Config;
use crate::content::content_type_for;
use crate::signing::{MetadataTokenSource, ServiceAccountTokenSource, SignError, TokenSource};

pub const DEFAULT_GCS_API_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComposeRequest<'a> {
    source_objects: Vec<SourceObject<'a>>,
    destination: Destination<'a>,
}

#[derive(Debug, Serialize)]
struct SourceObject<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Destination<'a> {
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

/// Server-side compose through the GCS JSON API (`objects.compose`)
///
/// Source bytes never pass through the gateway; GCS concatenates them in place.
pub struct GcsJsonApi {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for GcsJsonApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsJsonApi")
            .field("endpoint", &self.endpoint)
            .field("tokens", &self.tokens.kind())
            .finish_non_exhaustive()
    }
}

impl GcsJsonApi {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Key file credentials when configured, the metadata server otherwise
    pub fn from_config(config: &Config) -> std::result::Result<Self, SignError> {
        let http = reqwest::Client::new();
        let tokens: Arc<dyn TokenSource> = match config.storage.credentials_file.as_deref() {
            Some(path) => Arc::new(ServiceAccountTokenSource::from_file(http.clone(), path)?),
            None => Arc::new(MetadataTokenSource::new(
                http.clone(),
                &config.signing.metadata_endpoint,
            )),
        };

        let endpoint = config
            .storage
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_GCS_API_ENDPOINT.to_string());

        tracing::info!(%endpoint, tokens = tokens.kind(), "Using GCS server-side compose");
        Ok(Self::new(http, endpoint, tokens))
    }

    fn compose_url(&self, bucket: &str, dest: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| StoreError::Api {
            status: 0,
            message: format!("invalid endpoint '{}': {e}", self.endpoint),
        })?;

        url.path_segments_mut()
            .map_err(|_| StoreError::Api {
                status: 0,
                message: format!("endpoint '{}' cannot take a path", self.endpoint),
            })?
            .pop_if_empty()
            // Object names are one segment: '/' inside `dest` is percent-encoded
            .extend(["storage", "v1", "b", bucket, "o", dest, "compose"]);

        Ok(url)
    }

    /// Concatenate `sources` into `dest` inside `bucket`
    pub async fn compose(&self, bucket: &str, sources: &[String], dest: &str) -> Result<()> {
        let url = self.compose_url(bucket, dest)?;
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| StoreError::Auth(e.to_string()))?;

        let body = ComposeRequest {
            source_objects: sources.iter().map(|name| SourceObject { name }).collect(),
            destination: Destination {
                content_type: content_type_for(dest),
            },
        };

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Api {
                status: 0,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(bucket, dest, sources = sources.len(), "Composed objects server side");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|body| body.error.message)
            .unwrap_or(text);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(message));
        }

        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        Json, Router,
        extract::{Path as UrlPath, State},
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    struct FixedToken;

    #[async_trait]
    impl TokenSource for FixedToken {
        async fn access_token(&self) -> std::result::Result<String, SignError> {
            Ok("ya29.compose".to_string())
        }

        fn kind(&self) -> &'static str {
            "fixed"
        }
    }

    type Calls = Arc<Mutex<Vec<(String, String, Value)>>>;

    /// `objects.compose` stand-in: records calls, 404s when a source is named `missing`
    async fn start_mock_gcs() -> (String, Calls) {
        async fn compose(
            State(calls): State<Calls>,
            UrlPath((bucket, object)): UrlPath<(String, String)>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            if headers.get("authorization").and_then(|v| v.to_str().ok())
                != Some("Bearer ya29.compose")
            {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": {"message": "no token"}})));
            }

            let missing = body["sourceObjects"]
                .as_array()
                .into_iter()
                .flatten()
                .any(|source| source["name"] == "missing");
            calls.lock().unwrap().push((bucket, object.clone(), body));

            if missing {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": {"code": 404, "message": "No such object: missing"}})),
                );
            }
            (StatusCode::OK, Json(json!({"kind": "storage#object", "name": object})))
        }

        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/storage/v1/b/{bucket}/o/{object}/compose", post(compose))
            .with_state(calls.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), calls)
    }

    #[tokio::test]
    async fn test_compose_posts_sources_in_order() {
        let (endpoint, calls) = start_mock_gcs().await;
        let api = GcsJsonApi::new(reqwest::Client::new(), &endpoint, Arc::new(FixedToken));

        api.compose(
            "reports",
            &["tmp/r1/intermediate_0".into(), "tmp/r1/intermediate_1".into()],
            "merged/q3 report.pdf",
        )
        .await
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (bucket, object, body) = &calls[0];
        assert_eq!(bucket, "reports");
        assert_eq!(object, "merged/q3 report.pdf");
        assert_eq!(
            body["sourceObjects"],
            json!([{"name": "tmp/r1/intermediate_0"}, {"name": "tmp/r1/intermediate_1"}])
        );
        assert_eq!(body["destination"]["contentType"], "application/pdf");
    }

    #[tokio::test]
    async fn test_compose_maps_not_found() {
        let (endpoint, _calls) = start_mock_gcs().await;
        let api = GcsJsonApi::new(reqwest::Client::new(), &endpoint, Arc::new(FixedToken));

        let err = api
            .compose("reports", &["a".into(), "missing".into()], "out.bin")
            .await
            .unwrap_err();

        match err {
            StoreError::NotFound(message) => assert_eq!(message, "No such object: missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_compose_url_encodes_object_name() {
        let api = GcsJsonApi::new(
            reqwest::Client::new(),
            "https://storage.googleapis.com/",
            Arc::new(FixedToken),
        );

        let url = api.compose_url("reports", "merged/q3 report.pdf").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/reports/o/merged%2Fq3%20report.pdf/compose"
        );
    }

    #[test]
    fn test_from_config_prefers_key_file() {
        let mut config = Config::default();
        config.storage.credentials_file = Some(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures/service_account.json"),
        );
        config.storage.endpoint = Some("http://127.0.0.1:4443".into());

        let api = GcsJsonApi::from_config(&config).unwrap();
        assert_eq!(api.tokens.kind(), "service_account");
        assert_eq!(api.endpoint, "http://127.0.0.1:4443");

        config.storage.credentials_file = None;
        let api = GcsJsonApi::from_config(&config).unwrap();
        assert_eq!(api.tokens.kind(), "metadata");
    }
}
