//! BigQuery REST client
//!
//! Implements [`Warehouse`] on top of BigQuery API v2:
//!
//! - partition queries run through `jobs.query`, then `jobs.getQueryResults`
//!   until the job is complete and every page has been read
//! - extracts are inserted with `jobs.insert` and polled with `jobs.get`
//!   until the job state is `DONE`
//! - partition row counts come from `tables.get` on the partition decorator

use super::auth::AccessTokenProvider;
use crate::adapters::warehouse::{ExtractJob, ExtractRequest, PartitionQuery, Warehouse};
use crate::config::GcpConfig;
use crate::domain::{ExporterError, PartitionKey, Result, TableRef, WarehouseError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const DESTINATION_FORMAT: &str = "NEWLINE_DELIMITED_JSON";
const QUERY_WAIT_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<Row>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    status: Option<JobStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    num_rows: Option<String>,
}

/// BigQuery client running jobs in the source project
#[derive(Clone)]
pub struct BigQueryWarehouse {
    endpoint: Url,
    project_id: String,
    location: String,
    client: Client,
    auth: Arc<AccessTokenProvider>,
    poll_interval: Duration,
}

impl BigQueryWarehouse {
    /// Creates a client that bills jobs to `project_id`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not a valid URL.
    pub fn new(
        project_id: &str,
        location: &str,
        config: &GcpConfig,
        auth: Arc<AccessTokenProvider>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let endpoint = Url::parse(&config.bigquery_endpoint).map_err(|e| {
            ExporterError::Configuration(format!(
                "Invalid BigQuery endpoint '{}': {e}",
                config.bigquery_endpoint
            ))
        })?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                WarehouseError::ConnectionFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint,
            project_id: project_id.to_string(),
            location: location.to_string(),
            client,
            auth,
            poll_interval,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExporterError::Configuration(format!(
                    "BigQuery endpoint cannot be a base URL: {}",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.auth.token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| WarehouseError::ConnectionFailed(e.to_string()).into())
    }

    async fn api_error(response: Response) -> ExporterError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        WarehouseError::Api { status, message }.into()
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let mut url = self.url(&["projects", &self.project_id, "queries", &job.job_id])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeoutMs", &QUERY_WAIT_MS.to_string());
            query.append_pair(
                "location",
                job.location.as_deref().unwrap_or(&self.location),
            );
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }

        let response = self.send(self.client.get(url)).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| WarehouseError::InvalidResponse(e.to_string()).into())
    }

    /// Runs a query and returns the first column of every row as a string
    async fn query_first_column(&self, sql: &str) -> Result<Vec<String>> {
        let url = self.url(&["projects", &self.project_id, "queries"])?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "location": self.location,
            "timeoutMs": QUERY_WAIT_MS,
        });

        let response = self.send(self.client.post(url).json(&body)).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::QueryFailed(format!("{status}: {body}")).into());
        }

        let mut page: QueryResponse = response
            .json()
            .await
            .map_err(|e| WarehouseError::InvalidResponse(e.to_string()))?;
        let mut values = Vec::new();

        loop {
            if page.job_complete {
                for row in &page.rows {
                    if let Some(value) = row.f.first().and_then(|cell| cell.v.as_ref()) {
                        match value {
                            serde_json::Value::String(s) => values.push(s.clone()),
                            other => values.push(other.to_string()),
                        }
                    }
                }
            }

            let next_token = match (page.job_complete, page.page_token.as_deref()) {
                (true, None) | (true, Some("")) => break,
                (true, Some(token)) => Some(token.to_string()),
                (false, _) => {
                    tokio::time::sleep(self.poll_interval).await;
                    None
                }
            };

            let job = page.job_reference.clone().ok_or_else(|| {
                WarehouseError::InvalidResponse("query response has no jobReference".to_string())
            })?;
            page = self.get_query_results(&job, next_token.as_deref()).await?;
        }

        Ok(values)
    }

    async fn get_job(&self, job_id: &str, location: &str) -> Result<JobStatus> {
        let mut url = self.url(&["projects", &self.project_id, "jobs", job_id])?;
        url.query_pairs_mut().append_pair("location", location);

        let response = self.send(self.client.get(url)).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let job: JobResource = response
            .json()
            .await
            .map_err(|e| WarehouseError::InvalidResponse(e.to_string()))?;
        job.status.ok_or_else(|| {
            WarehouseError::InvalidResponse(format!("job {job_id} has no status")).into()
        })
    }
}

/// Extract job polled through `jobs.get`
pub struct BigQueryExtractJob {
    warehouse: BigQueryWarehouse,
    job_id: String,
    location: String,
}

#[async_trait]
impl ExtractJob for BigQueryExtractJob {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn wait(self: Box<Self>) -> Result<()> {
        loop {
            let status = self.warehouse.get_job(&self.job_id, &self.location).await?;
            if status.state == "DONE" {
                return match status.error_result {
                    Some(error) => Err(WarehouseError::JobFailed {
                        job_id: self.job_id.clone(),
                        message: format!("{}: {}", error.reason, error.message),
                    }
                    .into()),
                    None => Ok(()),
                };
            }

            tracing::trace!(job_id = %self.job_id, state = %status.state, "Extract job still running");
            tokio::time::sleep(self.warehouse.poll_interval).await;
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn distinct_partitions(&self, query: &PartitionQuery) -> Result<Vec<String>> {
        let sql = query.to_sql();
        tracing::debug!(sql = %sql, "Running partition query");
        self.query_first_column(&sql).await
    }

    async fn submit_extract(&self, request: &ExtractRequest) -> Result<Box<dyn ExtractJob>> {
        let job_id = format!("billing_export_{}", Uuid::new_v4().simple());
        let body = json!({
            "jobReference": {
                "projectId": self.project_id,
                "jobId": job_id,
                "location": request.location,
            },
            "configuration": {
                "extract": {
                    "sourceTable": {
                        "projectId": request.source.project_id,
                        "datasetId": request.source.dataset_id,
                        "tableId": request.source.partition_decorator(&request.partition),
                    },
                    "destinationUris": [request.destination_uri],
                    "destinationFormat": DESTINATION_FORMAT,
                }
            }
        });

        let url = self.url(&["projects", &self.project_id, "jobs"])?;
        let response = self.send(self.client.post(url).json(&body)).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::JobSubmissionFailed(format!("{status}: {body}")).into());
        }

        tracing::debug!(
            job_id = %job_id,
            partition = %request.partition,
            destination = %request.destination_uri,
            "Extract job submitted"
        );

        Ok(Box::new(BigQueryExtractJob {
            warehouse: self.clone(),
            job_id,
            location: request.location.clone(),
        }))
    }

    async fn partition_row_count(
        &self,
        table: &TableRef,
        partition: &PartitionKey,
    ) -> Result<Option<u64>> {
        let decorated = table.partition_decorator(partition);
        let url = self.url(&[
            "projects",
            &table.project_id,
            "datasets",
            &table.dataset_id,
            "tables",
            &decorated,
        ])?;

        let response = self.send(self.client.get(url)).await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(WarehouseError::TableNotFound(format!(
                    "{}.{}.{decorated}",
                    table.project_id, table.dataset_id
                ))
                .into())
            }
            _ => return Err(Self::api_error(response).await),
        }

        let resource: TableResource = response
            .json()
            .await
            .map_err(|e| WarehouseError::InvalidResponse(e.to_string()))?;
        resource
            .num_rows
            .map(|rows| {
                rows.parse::<u64>().map_err(|_| {
                    ExporterError::from(WarehouseError::InvalidResponse(format!(
                        "invalid numRows '{rows}'"
                    )))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;
    use mockito::Matcher;

    fn warehouse(endpoint: &str) -> BigQueryWarehouse {
        let config = GcpConfig {
            bigquery_endpoint: endpoint.to_string(),
            access_token: Some(secret_string("bq-token".to_string())),
            ..GcpConfig::default()
        };
        let auth = Arc::new(AccessTokenProvider::new(&config).unwrap());
        BigQueryWarehouse::new("prj", "US", &config, auth, Duration::from_millis(5)).unwrap()
    }

    fn key(s: &str) -> PartitionKey {
        PartitionKey::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_distinct_partitions_completed_inline() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/prj/queries")
            .match_header("authorization", "Bearer bq-token")
            .match_body(Matcher::PartialJson(json!({"useLegacySql": false})))
            .with_status(200)
            .with_body(
                r#"{"jobComplete":true,"jobReference":{"jobId":"q1","location":"US"},
                   "rows":[{"f":[{"v":"20240101"}]},{"f":[{"v":"20240102"}]}]}"#,
            )
            .create_async()
            .await;

        let parts = warehouse(&server.url())
            .distinct_partitions(&PartitionQuery::all(TableRef::new("prj", "ds", "t")))
            .await
            .unwrap();
        assert_eq!(parts, vec!["20240101", "20240102"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_distinct_partitions_polls_until_complete() {
        let mut server = mockito::Server::new_async().await;
        let _start = server
            .mock("POST", "/projects/prj/queries")
            .with_status(200)
            .with_body(r#"{"jobComplete":false,"jobReference":{"jobId":"q2","location":"US"}}"#)
            .create_async()
            .await;
        let _results = server
            .mock("GET", "/projects/prj/queries/q2")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"jobComplete":true,"jobReference":{"jobId":"q2","location":"US"},
                   "rows":[{"f":[{"v":"20240301"}]}]}"#,
            )
            .create_async()
            .await;

        let parts = warehouse(&server.url())
            .distinct_partitions(&PartitionQuery::all(TableRef::new("prj", "ds", "t")))
            .await
            .unwrap();
        assert_eq!(parts, vec!["20240301"]);
    }

    #[tokio::test]
    async fn test_query_failure() {
        let mut server = mockito::Server::new_async().await;
        let _fail = server
            .mock("POST", "/projects/prj/queries")
            .with_status(400)
            .with_body(r#"{"error":{"message":"Syntax error"}}"#)
            .create_async()
            .await;

        let err = warehouse(&server.url())
            .distinct_partitions(&PartitionQuery::all(TableRef::new("prj", "ds", "t")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExporterError::Warehouse(WarehouseError::QueryFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_job_success() {
        let mut server = mockito::Server::new_async().await;
        let insert = server
            .mock("POST", "/projects/prj/jobs")
            .match_body(Matcher::PartialJson(json!({
                "configuration": {"extract": {
                    "sourceTable": {"tableId": "t$20240101"},
                    "destinationFormat": "NEWLINE_DELIMITED_JSON"
                }}
            })))
            .with_status(200)
            .with_body(r#"{"status":{"state":"RUNNING"}}"#)
            .create_async()
            .await;
        let _get = server
            .mock("GET", Matcher::Regex(r"^/projects/prj/jobs/billing_export_".to_string()))
            .with_status(200)
            .with_body(r#"{"status":{"state":"DONE"}}"#)
            .create_async()
            .await;

        let request = ExtractRequest {
            source: TableRef::new("prj", "ds", "t"),
            partition: key("20240101"),
            destination_uri: "gs://archive/t/20240101/billing-export-*.json".to_string(),
            location: "US".to_string(),
        };
        let job = warehouse(&server.url())
            .submit_extract(&request)
            .await
            .unwrap();
        assert!(job.job_id().starts_with("billing_export_"));
        job.wait().await.unwrap();
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn test_extract_job_error_result() {
        let mut server = mockito::Server::new_async().await;
        let _insert = server
            .mock("POST", "/projects/prj/jobs")
            .with_status(200)
            .with_body(r#"{"status":{"state":"PENDING"}}"#)
            .create_async()
            .await;
        let _get = server
            .mock("GET", Matcher::Regex(r"^/projects/prj/jobs/".to_string()))
            .with_status(200)
            .with_body(
                r#"{"status":{"state":"DONE","errorResult":{"reason":"accessDenied","message":"no write access"}}}"#,
            )
            .create_async()
            .await;

        let request = ExtractRequest {
            source: TableRef::new("prj", "ds", "t"),
            partition: key("20240110"),
            destination_uri: "gs://archive/t/20240110/billing-export-*.json".to_string(),
            location: "US".to_string(),
        };
        let job = warehouse(&server.url())
            .submit_extract(&request)
            .await
            .unwrap();
        let err = job.wait().await.unwrap_err();
        assert!(err.to_string().contains("accessDenied"));
    }

    #[tokio::test]
    async fn test_partition_row_count() {
        let mut server = mockito::Server::new_async().await;
        let _table = server
            .mock("GET", "/projects/prj/datasets/ds/tables/t$20240101")
            .with_status(200)
            .with_body(r#"{"numRows":"42"}"#)
            .create_async()
            .await;

        let rows = warehouse(&server.url())
            .partition_row_count(&TableRef::new("prj", "ds", "t"), &key("20240101"))
            .await
            .unwrap();
        assert_eq!(rows, Some(42));
    }
}
