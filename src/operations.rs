use crate::client::ApiClient;
use crate::error::{ApiError, OperationError};
use crate::payload::{
    self, BulkOptions, ComposeOptions, ScheduleOptions, ScheduleUpdate, ScreenshotOptions,
};
use base64::Engine as _;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const DEFAULT_BINARY_PROPERTY: &str = "data";

// ─── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureParams {
    #[serde(flatten)]
    pub options: ScreenshotOptions,
    #[serde(default = "default_binary_property")]
    pub binary_property_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureAsyncParams {
    #[serde(flatten)]
    pub options: ScreenshotOptions,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParams {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultParams {
    pub job_id: String,
    #[serde(default = "default_binary_property")]
    pub binary_property_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListJobsParams {
    pub list_options: ListJobsOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListJobsOptions {
    /// PENDING, PROCESSING, COMPLETED, FAILED or CANCELLED. Empty means all.
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobParams {
    pub bulk_job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeParams {
    #[serde(flatten)]
    pub options: ComposeOptions,
    #[serde(default = "default_binary_property")]
    pub binary_property_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeJobParams {
    pub compose_job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleParams {
    pub schedule_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleParams {
    pub schedule_id: String,
    #[serde(default)]
    pub update_fields: ScheduleUpdate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryOptions {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleHistoryParams {
    pub schedule_id: String,
    #[serde(default)]
    pub history_options: HistoryOptions,
}

fn default_binary_property() -> String {
    DEFAULT_BINARY_PROPERTY.into()
}

// ─── Operation ───────────────────────────────────────────────────────────────

/// One variant per (resource, operation) pair the node exposes.
#[derive(Debug, Clone)]
pub enum Operation {
    CaptureScreenshot(CaptureParams),
    CaptureScreenshotAsync(CaptureAsyncParams),

    GetJobStatus(JobParams),
    GetJobResult(JobResultParams),
    CancelJob(JobParams),
    ListJobs(ListJobsParams),

    CreateBulk(BulkOptions),
    GetBulkStatus(BulkJobParams),
    ListBulk,
    CancelBulk(BulkJobParams),

    CreateCompose(ComposeParams),
    GetComposeStatus(ComposeJobParams),
    ListCompose,

    CreateSchedule(ScheduleOptions),
    GetSchedule(ScheduleParams),
    ListSchedules,
    UpdateSchedule(UpdateScheduleParams),
    DeleteSchedule(ScheduleParams),
    PauseSchedule(ScheduleParams),
    ResumeSchedule(ScheduleParams),
    TriggerSchedule(ScheduleParams),
    GetScheduleHistory(ScheduleHistoryParams),

    GetUsageStats,
    GetQuota,
}

fn params<T: DeserializeOwned>(input: &Value) -> Result<T, OperationError> {
    serde_json::from_value(input.clone())
        .map_err(|e| OperationError::InvalidParameters(e.to_string()))
}

fn require(field: &str, value: &str) -> Result<(), OperationError> {
    if value.trim().is_empty() {
        Err(OperationError::InvalidParameters(format!(
            "missing required field: {field}"
        )))
    } else {
        Ok(())
    }
}

impl Operation {
    /// Resolve a resource/operation pair and its input record into a typed operation.
    pub fn resolve(resource: &str, operation: &str, input: &Value) -> Result<Self, OperationError> {
        let op = match (resource, operation) {
            ("screenshot", "capture") => {
                let p: CaptureParams = params(input)?;
                require("url", &p.options.url)?;
                Operation::CaptureScreenshot(p)
            }
            ("screenshot", "captureAsync") => {
                let p: CaptureAsyncParams = params(input)?;
                require("url", &p.options.url)?;
                Operation::CaptureScreenshotAsync(p)
            }

            ("asyncJob", "getStatus") => Operation::GetJobStatus(params(input)?),
            ("asyncJob", "getResult") => Operation::GetJobResult(params(input)?),
            ("asyncJob", "cancel") => Operation::CancelJob(params(input)?),
            ("asyncJob", "list") => Operation::ListJobs(params(input)?),

            ("bulk", "create") => {
                let p: BulkOptions = params(input)?;
                if payload::split_lines(&p.urls).is_empty() {
                    return Err(OperationError::InvalidParameters(
                        "urls must contain at least one URL".into(),
                    ));
                }
                Operation::CreateBulk(p)
            }
            ("bulk", "getStatus") => Operation::GetBulkStatus(params(input)?),
            ("bulk", "list") => Operation::ListBulk,
            ("bulk", "cancel") => Operation::CancelBulk(params(input)?),

            ("compose", "create") => {
                let p: ComposeParams = params(input)?;
                if payload::split_lines(&p.options.urls).is_empty() {
                    return Err(OperationError::InvalidParameters(
                        "urls must contain at least one URL".into(),
                    ));
                }
                Operation::CreateCompose(p)
            }
            ("compose", "getStatus") => Operation::GetComposeStatus(params(input)?),
            ("compose", "list") => Operation::ListCompose,

            ("schedule", "create") => {
                let p: ScheduleOptions = params(input)?;
                require("name", &p.name)?;
                require("url", &p.url)?;
                require("cron", &p.cron)?;
                Operation::CreateSchedule(p)
            }
            ("schedule", "get") => Operation::GetSchedule(params(input)?),
            ("schedule", "list") => Operation::ListSchedules,
            ("schedule", "update") => Operation::UpdateSchedule(params(input)?),
            ("schedule", "delete") => Operation::DeleteSchedule(params(input)?),
            ("schedule", "pause") => Operation::PauseSchedule(params(input)?),
            ("schedule", "resume") => Operation::ResumeSchedule(params(input)?),
            ("schedule", "trigger") => Operation::TriggerSchedule(params(input)?),
            ("schedule", "getHistory") => Operation::GetScheduleHistory(params(input)?),

            ("usage", "getStats") => Operation::GetUsageStats,
            ("usage", "getQuota") => Operation::GetQuota,

            _ => {
                return Err(OperationError::UnknownOperation {
                    resource: resource.to_string(),
                    operation: operation.to_string(),
                })
            }
        };
        Ok(op)
    }
}

// ─── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryData {
    pub file_name: String,
    pub mime_type: String,
    /// Base64-encoded file contents.
    pub data: String,
}

impl BinaryData {
    fn new(bytes: &[u8], file_name: String, mime_type: String) -> Self {
        Self {
            file_name,
            mime_type,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// One item handed back to the host workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    pub json: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BTreeMap<String, BinaryData>>,
    pub paired_item: usize,
}

impl OutputRecord {
    pub fn json(json: Value, item: usize) -> Self {
        Self {
            json,
            binary: None,
            paired_item: item,
        }
    }

    fn with_binary(mut self, property: &str, data: BinaryData) -> Self {
        self.binary
            .get_or_insert_with(BTreeMap::new)
            .insert(property.to_string(), data);
        self
    }
}

fn mime_type(format: &str) -> String {
    if format == "pdf" {
        "application/pdf".into()
    } else {
        format!("image/{format}")
    }
}

/// One record per element when the API returns an array.
fn expand(response: Value, item: usize) -> Vec<OutputRecord> {
    match response {
        Value::Array(items) => items
            .into_iter()
            .map(|v| OutputRecord::json(v, item))
            .collect(),
        other => vec![OutputRecord::json(other, item)],
    }
}

// ─── Execution ───────────────────────────────────────────────────────────────

async fn get(client: &ApiClient, endpoint: &str) -> Result<Value, ApiError> {
    client.request(Method::GET, endpoint, None, &[]).await
}

async fn post(client: &ApiClient, endpoint: &str, body: Option<&Value>) -> Result<Value, ApiError> {
    client.request(Method::POST, endpoint, body, &[]).await
}

/// Run one resolved operation for input record `item`.
pub async fn execute(
    client: &ApiClient,
    op: &Operation,
    item: usize,
) -> Result<Vec<OutputRecord>, OperationError> {
    let records = match op {
        Operation::CaptureScreenshot(p) => {
            let body = payload::screenshot_payload(&p.options);
            let format = p.options.format();
            let bytes = client
                .request_binary(Method::POST, "/v1/screenshots", Some(&body))
                .await?;
            let record = OutputRecord::json(
                json!({ "success": true, "url": p.options.url, "format": format }),
                item,
            )
            .with_binary(
                &p.binary_property_name,
                BinaryData::new(&bytes, format!("screenshot.{format}"), mime_type(format)),
            );
            vec![record]
        }
        Operation::CaptureScreenshotAsync(p) => {
            let mut body = payload::screenshot_payload(&p.options);
            if let Some(url) = p.webhook_url.as_deref().filter(|u| !u.is_empty()) {
                body["webhookUrl"] = json!(url);
            }
            let resp = post(client, "/v1/screenshots/async", Some(&body)).await?;
            vec![OutputRecord::json(resp, item)]
        }

        Operation::GetJobStatus(p) => {
            let resp = get(client, &format!("/v1/screenshots/jobs/{}", p.job_id)).await?;
            vec![OutputRecord::json(resp, item)]
        }
        Operation::GetJobResult(p) => {
            let status = get(client, &format!("/v1/screenshots/jobs/{}", p.job_id)).await?;
            let state = status.get("status").and_then(Value::as_str).unwrap_or("");
            if state != "COMPLETED" {
                return Err(OperationError::JobNotCompleted {
                    job_id: p.job_id.clone(),
                    status: state.to_string(),
                });
            }
            let bytes = client
                .request_binary(
                    Method::GET,
                    &format!("/v1/screenshots/jobs/{}/result", p.job_id),
                    None,
                )
                .await?;
            let format = status
                .pointer("/metadata/format")
                .and_then(Value::as_str)
                .filter(|f| !f.is_empty())
                .unwrap_or("png")
                .to_string();
            let binary =
                BinaryData::new(&bytes, format!("screenshot.{format}"), mime_type(&format));
            vec![OutputRecord::json(status, item).with_binary(&p.binary_property_name, binary)]
        }
        Operation::CancelJob(p) => {
            let resp = post(client, &format!("/v1/screenshots/jobs/{}/cancel", p.job_id), None)
                .await?;
            vec![OutputRecord::json(resp, item)]
        }
        Operation::ListJobs(p) => {
            let mut query = Vec::new();
            if let Some(status) = p.list_options.status.as_deref().filter(|s| !s.is_empty()) {
                query.push(("status", status.to_string()));
            }
            if let Some(limit) = p.list_options.limit.filter(|l| *l > 0) {
                query.push(("limit", limit.to_string()));
            }
            let resp = client
                .request(Method::GET, "/v1/screenshots/jobs", None, &query)
                .await?;
            expand(resp, item)
        }

        Operation::CreateBulk(p) => {
            let body = payload::bulk_payload(p);
            let resp = post(client, "/v1/screenshots/bulk", Some(&body)).await?;
            vec![OutputRecord::json(resp, item)]
        }
        Operation::GetBulkStatus(p) => {
            let resp = get(client, &format!("/v1/screenshots/bulk/{}", p.bulk_job_id)).await?;
            vec![OutputRecord::json(resp, item)]
        }
        Operation::ListBulk => expand(get(client, "/v1/screenshots/bulk").await?, item),
        Operation::CancelBulk(p) => {
            let endpoint = format!("/v1/screenshots/bulk/{}/cancel", p.bulk_job_id);
            vec![OutputRecord::json(post(client, &endpoint, None).await?, item)]
        }

        Operation::CreateCompose(p) => {
            let body = payload::compose_payload(&p.options);
            if p.options.is_async {
                let resp = post(client, "/v1/screenshots/compose", Some(&body)).await?;
                vec![OutputRecord::json(resp, item)]
            } else {
                let format = p.options.format();
                let bytes = client
                    .request_binary(Method::POST, "/v1/screenshots/compose", Some(&body))
                    .await?;
                let binary =
                    BinaryData::new(&bytes, format!("composed.{format}"), mime_type(format));
                vec![
                    OutputRecord::json(json!({ "success": true, "format": format }), item)
                        .with_binary(&p.binary_property_name, binary),
                ]
            }
        }
        Operation::GetComposeStatus(p) => {
            let endpoint = format!("/v1/screenshots/compose/jobs/{}", p.compose_job_id);
            vec![OutputRecord::json(get(client, &endpoint).await?, item)]
        }
        Operation::ListCompose => expand(get(client, "/v1/screenshots/compose/jobs").await?, item),

        Operation::CreateSchedule(p) => {
            let body = payload::schedule_payload(p);
            vec![OutputRecord::json(post(client, "/v1/schedules", Some(&body)).await?, item)]
        }
        Operation::GetSchedule(p) => {
            let endpoint = format!("/v1/schedules/{}", p.schedule_id);
            vec![OutputRecord::json(get(client, &endpoint).await?, item)]
        }
        Operation::ListSchedules => {
            let resp = get(client, "/v1/schedules").await?;
            match resp {
                Value::Object(mut body) if body.get("schedules").is_some_and(Value::is_array) => {
                    expand(body.remove("schedules").unwrap_or_default(), item)
                }
                other => expand(other, item),
            }
        }
        Operation::UpdateSchedule(p) => {
            let body = payload::schedule_update_payload(&p.update_fields);
            let resp = client
                .request(
                    Method::PUT,
                    &format!("/v1/schedules/{}", p.schedule_id),
                    Some(&body),
                    &[],
                )
                .await?;
            vec![OutputRecord::json(resp, item)]
        }
        Operation::DeleteSchedule(p) => {
            client
                .request(
                    Method::DELETE,
                    &format!("/v1/schedules/{}", p.schedule_id),
                    None,
                    &[],
                )
                .await?;
            vec![OutputRecord::json(
                json!({ "success": true, "deleted": p.schedule_id }),
                item,
            )]
        }
        Operation::PauseSchedule(p) => {
            let endpoint = format!("/v1/schedules/{}/pause", p.schedule_id);
            vec![OutputRecord::json(post(client, &endpoint, None).await?, item)]
        }
        Operation::ResumeSchedule(p) => {
            let endpoint = format!("/v1/schedules/{}/resume", p.schedule_id);
            vec![OutputRecord::json(post(client, &endpoint, None).await?, item)]
        }
        Operation::TriggerSchedule(p) => {
            let endpoint = format!("/v1/schedules/{}/trigger", p.schedule_id);
            vec![OutputRecord::json(post(client, &endpoint, None).await?, item)]
        }
        Operation::GetScheduleHistory(p) => {
            let mut query = Vec::new();
            if let Some(limit) = p.history_options.limit.filter(|l| *l > 0) {
                query.push(("limit", limit.to_string()));
            }
            let resp = client
                .request(
                    Method::GET,
                    &format!("/v1/schedules/{}/history", p.schedule_id),
                    None,
                    &query,
                )
                .await?;
            vec![OutputRecord::json(resp, item)]
        }

        Operation::GetUsageStats => vec![OutputRecord::json(get(client, "/v1/usage").await?, item)],
        Operation::GetQuota => vec![OutputRecord::json(client.test_credentials().await?, item)],
    };
    Ok(records)
}

/// Resolve and run every input record. With `continue_on_fail`, a failing
/// record yields `{ "error": ... }` instead of aborting the batch.
pub async fn run_batch(
    client: &ApiClient,
    resource: &str,
    operation: &str,
    inputs: &[Value],
    continue_on_fail: bool,
) -> Result<Vec<OutputRecord>, OperationError> {
    let mut out = Vec::new();
    for (item, input) in inputs.iter().enumerate() {
        let result = match Operation::resolve(resource, operation, input) {
            Ok(op) => execute(client, &op, item).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(records) => out.extend(records),
            Err(e) if continue_on_fail => {
                tracing::warn!(resource, operation, item, error = %e, "item failed, continuing");
                out.push(OutputRecord::json(json!({ "error": e.to_string() }), item));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Credentials;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        let creds = Credentials {
            api_key: "test-key".into(),
            base_url: server.uri(),
        };
        ApiClient::new(&creds, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_resolve_known_pairs() {
        let op = Operation::resolve("asyncJob", "getStatus", &json!({"jobId": "job_1"})).unwrap();
        assert!(matches!(op, Operation::GetJobStatus(p) if p.job_id == "job_1"));

        let op = Operation::resolve("usage", "getQuota", &json!({})).unwrap();
        assert!(matches!(op, Operation::GetQuota));

        let op = Operation::resolve("screenshot", "capture", &json!({"url": "https://a.com"}))
            .unwrap();
        match op {
            Operation::CaptureScreenshot(p) => {
                assert_eq!(p.binary_property_name, "data");
                assert_eq!(p.options.format(), "png");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_pair() {
        let err = Operation::resolve("screenshot", "delete", &json!({})).unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation { .. }));
        let err = Operation::resolve("Screenshot", "capture", &json!({})).unwrap_err();
        assert!(matches!(err, OperationError::UnknownOperation { .. }));
    }

    #[test]
    fn test_resolve_validates_required_fields() {
        assert!(matches!(
            Operation::resolve("screenshot", "capture", &json!({})),
            Err(OperationError::InvalidParameters(_))
        ));
        assert!(matches!(
            Operation::resolve("asyncJob", "cancel", &json!({})),
            Err(OperationError::InvalidParameters(_))
        ));
        assert!(matches!(
            Operation::resolve("bulk", "create", &json!({"urls": "\n  \n"})),
            Err(OperationError::InvalidParameters(_))
        ));
        assert!(matches!(
            Operation::resolve("schedule", "create", &json!({"name": "n", "url": "u"})),
            Err(OperationError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_returns_binary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/screenshots"))
            .and(body_json(json!({"url": "https://a.com", "format": "pdf"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF".to_vec()))
            .mount(&server)
            .await;

        let op = Operation::resolve(
            "screenshot",
            "capture",
            &json!({
                "url": "https://a.com",
                "outputOptions": {"format": "pdf"},
                "binaryPropertyName": "shot"
            }),
        )
        .unwrap();
        let records = execute(&client(&server), &op, 3).await.unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.paired_item, 3);
        assert_eq!(rec.json["format"], json!("pdf"));
        let bin = &rec.binary.as_ref().unwrap()["shot"];
        assert_eq!(bin.file_name, "screenshot.pdf");
        assert_eq!(bin.mime_type, "application/pdf");
        assert_eq!(bin.data, "JVBERg==");
    }

    #[tokio::test]
    async fn test_job_result_requires_completion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/jobs/job_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "PROCESSING"})))
            .mount(&server)
            .await;

        let op = Operation::resolve("asyncJob", "getResult", &json!({"jobId": "job_1"})).unwrap();
        let err = execute(&client(&server), &op, 0).await.unwrap_err();
        assert!(
            matches!(err, OperationError::JobNotCompleted { ref status, .. } if status == "PROCESSING")
        );
    }

    #[tokio::test]
    async fn test_job_result_uses_metadata_format() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/jobs/job_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "COMPLETED",
                "metadata": {"format": "webp"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/jobs/job_1/result"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2, 3]))
            .mount(&server)
            .await;

        let op = Operation::resolve("asyncJob", "getResult", &json!({"jobId": "job_1"})).unwrap();
        let records = execute(&client(&server), &op, 0).await.unwrap();
        let bin = &records[0].binary.as_ref().unwrap()["data"];
        assert_eq!(bin.mime_type, "image/webp");
        assert_eq!(bin.file_name, "screenshot.webp");
        assert_eq!(records[0].json["status"], json!("COMPLETED"));
    }

    #[tokio::test]
    async fn test_list_jobs_expands_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/jobs"))
            .and(query_param("status", "FAILED"))
            .and(query_param("limit", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "a"}, {"id": "b"}])),
            )
            .mount(&server)
            .await;

        let op = Operation::resolve(
            "asyncJob",
            "list",
            &json!({"listOptions": {"status": "FAILED", "limit": 2}}),
        )
        .unwrap();
        let records = execute(&client(&server), &op, 0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].json, json!({"id": "b"}));
    }

    #[tokio::test]
    async fn test_list_schedules_unwraps_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schedules": [{"id": "s1"}, {"id": "s2"}, {"id": "s3"}],
                "total": 3
            })))
            .mount(&server)
            .await;

        let records = execute(&client(&server), &Operation::ListSchedules, 0)
            .await
            .unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_schedule_reports_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/schedules/s1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let op = Operation::resolve("schedule", "delete", &json!({"scheduleId": "s1"})).unwrap();
        let records = execute(&client(&server), &op, 0).await.unwrap();
        assert_eq!(records[0].json, json!({"success": true, "deleted": "s1"}));
    }

    #[tokio::test]
    async fn test_batch_continue_on_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/bulk/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "ok"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/screenshots/bulk/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not found"})))
            .mount(&server)
            .await;

        let inputs = vec![
            json!({"bulkJobId": "missing"}),
            json!({"bulkJobId": "ok"}),
        ];
        let c = client(&server);

        let records = run_batch(&c, "bulk", "getStatus", &inputs, true).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].paired_item, 0);
        assert!(records[0].json["error"].as_str().unwrap().contains("Not found"));
        assert_eq!(records[1].json, json!({"id": "ok"}));

        let err = run_batch(&c, "bulk", "getStatus", &inputs, false).await.unwrap_err();
        assert!(matches!(err, OperationError::Api(ApiError::Status { status: 404, .. })));
    }
}
