//! Cloud Storage JSON API client
//!
//! Implements [`ObjectStore`] against `storage/v1` for a single bucket.
//! Object names are percent-encoded as one path segment so names with `/`
//! address the object rather than a sub-resource.

use super::auth::AccessTokenProvider;
use crate::adapters::storage::{ObjectMeta, ObjectStore};
use crate::config::GcpConfig;
use crate::domain::{ExporterError, Result, StorageError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    /// uint64 values are strings in the JSON API
    #[serde(default)]
    size: Option<String>,
}

/// Cloud Storage client bound to one bucket
pub struct GcsObjectStore {
    bucket: String,
    endpoint: Url,
    client: Client,
    auth: Arc<AccessTokenProvider>,
}

impl GcsObjectStore {
    /// Creates a client for `bucket`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not a valid URL.
    pub fn new(bucket: &str, config: &GcpConfig, auth: Arc<AccessTokenProvider>) -> Result<Self> {
        let endpoint = Url::parse(&config.storage_endpoint).map_err(|e| {
            ExporterError::Configuration(format!(
                "Invalid storage endpoint '{}': {e}",
                config.storage_endpoint
            ))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StorageError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            bucket: bucket.to_string(),
            endpoint,
            client,
            auth,
        })
    }

    /// URL made of the endpoint followed by `segments`, each encoded as one segment
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExporterError::Configuration(format!(
                    "Storage endpoint cannot be a base URL: {}",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.auth.token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()).into())
    }

    async fn api_error(response: Response) -> ExporterError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StorageError::Api { status, message }.into()
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        let url = self.url(&["storage", "v1", "b", &self.bucket])?;
        let response = self.send(self.client.get(url)).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                query.append_pair("fields", "items(name,size),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self.send(self.client.get(url)).await?;
            if !response.status().is_success() {
                return Err(Self::api_error(response).await);
            }

            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

            for item in page.items {
                let size = match item.size.as_deref() {
                    Some(size) => size.parse().map_err(|_| {
                        StorageError::InvalidResponse(format!(
                            "object {} has invalid size '{size}'",
                            item.name
                        ))
                    })?,
                    None => 0,
                };
                objects.push(ObjectMeta {
                    name: item.name,
                    size,
                });
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(prefix = %prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn read_object(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self.send(self.client.get(url)).await?;
        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::api_error(response).await),
        }
    }

    /// Streams the media download chunk by chunk into `path`
    async fn download_to_file(&self, name: &str, path: &Path) -> Result<u64> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let mut response = self.send(self.client.get(url)).await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StorageError::ObjectNotFound(format!("{}/{}", self.bucket, name)).into())
            }
            _ => return Err(Self::api_error(response).await),
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::trace!(object = %name, bytes = written, "Downloaded object");
        Ok(written)
    }

    async fn write_object(&self, name: &str, data: Vec<u8>) -> Result<()> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        let response = self.send(request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::WriteFailed {
                name: name.to_string(),
                message: format!("{status}: {body}"),
            }
            .into());
        }
        Ok(())
    }

    async fn object_exists(&self, name: &str) -> Result<bool> {
        let response = self.send(self.client.get(self.object_url(name)?)).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(Self::api_error(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use mockito::Matcher;

    fn store(endpoint: &str) -> GcsObjectStore {
        let config = GcpConfig {
            storage_endpoint: endpoint.to_string(),
            access_token: Some(secret_string("test-token".to_string())),
            ..GcpConfig::default()
        };
        let auth = Arc::new(AccessTokenProvider::new(&config).unwrap());
        GcsObjectStore::new("archive", &config, auth).unwrap()
    }

    #[tokio::test]
    async fn test_bucket_exists() {
        let mut server = mockito::Server::new_async().await;
        let _found = server
            .mock("GET", "/storage/v1/b/archive")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"name":"archive"}"#)
            .create_async()
            .await;

        assert!(store(&server.url()).bucket_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_bucket_missing() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/storage/v1/b/archive")
            .with_status(404)
            .create_async()
            .await;

        assert!(!store(&server.url()).bucket_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_list_objects_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let _second = server
            .mock("GET", "/storage/v1/b/archive/o")
            .match_query(Matcher::Regex("pageToken=next$".to_string()))
            .with_status(200)
            .with_body(r#"{"items":[{"name":"t/20240101/billing-export-000000000001.json","size":"7"}]}"#)
            .create_async()
            .await;
        let _first = server
            .mock("GET", "/storage/v1/b/archive/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("prefix".into(), "t/20240101/".into()),
                Matcher::Regex("fields=[^&]*$".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"items":[{"name":"t/20240101/billing-export-000000000000.json","size":"10"}],"nextPageToken":"next"}"#,
            )
            .create_async()
            .await;

        let objects = store(&server.url())
            .list_objects("t/20240101/")
            .await
            .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.iter().map(|o| o.size).sum::<u64>(), 17);
    }

    #[tokio::test]
    async fn test_read_missing_object() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", Matcher::Regex(r"^/storage/v1/b/archive/o/".to_string()))
            .with_status(404)
            .create_async()
            .await;

        let result = store(&server.url())
            .read_object("t/process_status/extract_status_file.json")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_download_streams_into_file() {
        let mut server = mockito::Server::new_async().await;
        let body: String = (0..5000).map(|i| format!("{{\"row\":{i}}}\n")).collect();
        let _media = server
            .mock("GET", Matcher::Regex(r"^/storage/v1/b/archive/o/".to_string()))
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("temp.json");
        let written = store(&server.url())
            .download_to_file("t/20240101/billing-export-000000000000.json", &path)
            .await
            .unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_missing_object() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", Matcher::Regex(r"^/storage/v1/b/archive/o/".to_string()))
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let err = store(&server.url())
            .download_to_file("t/20240101/gone.json", &dir.path().join("temp.json"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Storage(StorageError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_object_uploads_media() {
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/upload/storage/v1/b/archive/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "media".into()),
                Matcher::UrlEncoded(
                    "name".into(),
                    "t/process_status/extract_status_file.json".into(),
                ),
            ]))
            .match_body("{}")
            .with_status(200)
            .with_body(r#"{"name":"t/process_status/extract_status_file.json"}"#)
            .create_async()
            .await;

        store(&server.url())
            .write_object("t/process_status/extract_status_file.json", b"{}".to_vec())
            .await
            .unwrap();
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _denied = server
            .mock("POST", "/upload/storage/v1/b/archive/o")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("denied")
            .create_async()
            .await;

        let err = store(&server.url())
            .write_object("t/x.json", vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Storage(StorageError::WriteFailed { .. })
        ));
    }
}
