//! 识别服务客户端
//!
//! 一次调用提交一个文档及其页码，服务逐页返回记录或错误。
//! 调用可能持续数分钟；取消通过 `signal_cancel` 按会话ID单独发送，
//! 服务在处理完当前页后停止。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RemoteError;
use crate::models::{DocumentHandle, ExtractedRecord, SessionId};

/// 单页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    pub page_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<ExtractedRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageOutcome {
    pub fn ok(page_number: u32, records: Vec<ExtractedRecord>) -> Self {
        Self {
            page_number,
            records: Some(records),
            error: None,
        }
    }

    pub fn failed(page_number: u32, error: impl Into<String>) -> Self {
        Self {
            page_number,
            records: None,
            error: Some(error.into()),
        }
    }

    /// 出错的页不算完成
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// 识别服务的最终返回
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(default)]
    pub pages: Vec<PageOutcome>,
}

/// 远程识别调用
#[async_trait]
pub trait RemoteScanInvoker: Send + Sync {
    /// 提交文档的指定页
    async fn submit(
        &self,
        file: &DocumentHandle,
        pages: &[u32],
        session_id: &SessionId,
    ) -> Result<ScanResponse, RemoteError>;

    /// 发送取消信号（写入会话共享状态，不会被撤回）
    async fn signal_cancel(&self, session_id: &SessionId) -> Result<(), RemoteError>;
}

/// HTTP 识别服务客户端
pub struct HttpScanInvoker {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
}

impl HttpScanInvoker {
    /// 创建新的识别服务客户端
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.scan_timeout())
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.scan_api_base_url.trim_end_matches('/').to_string(),
            token: config.scan_api_token.clone(),
            timeout_secs: config.scan_timeout_secs,
        }
    }

    fn map_send_error(&self, endpoint: &str, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout_secs)
        } else {
            RemoteError::request_failed(endpoint, err)
        }
    }
}

/// 页码列表 → `1,3,4`
fn join_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl RemoteScanInvoker for HttpScanInvoker {
    async fn submit(
        &self,
        file: &DocumentHandle,
        pages: &[u32],
        session_id: &SessionId,
    ) -> Result<ScanResponse, RemoteError> {
        let endpoint = format!("{}/scan", self.base_url);
        let bytes = tokio::fs::read(file.path())
            .await
            .map_err(|source| RemoteError::FileReadFailed {
                path: file.path().display().to_string(),
                source,
            })?;

        debug!(
            "提交识别: {} ({} 字节) 页码 {:?} 会话 {}",
            file.file_name(),
            bytes.len(),
            pages,
            session_id
        );

        let session = session_id.to_string();
        let file_name = file.file_name();
        let page_list = join_pages(pages);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .query(&[
                ("sessionId", session.as_str()),
                ("fileName", file_name.as_str()),
                ("pages", page_list.as_str()),
            ])
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.ok().filter(|t| !t.is_empty());
            warn!("识别服务返回错误: status={} message={:?}", status, message);
            return Err(RemoteError::BadResponse {
                endpoint,
                status: status.as_u16(),
                message,
            });
        }

        let body: ScanResponse = response
            .json()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;
        debug!("识别返回 {} 页 (success={})", body.pages.len(), body.success);
        Ok(body)
    }

    async fn signal_cancel(&self, session_id: &SessionId) -> Result<(), RemoteError> {
        let endpoint = format!("{}/scan/{}/cancel", self.base_url, session_id);
        info!("🛑 发送取消信号: 会话 {}", session_id);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| self.map_send_error(&endpoint, e))?;

        if !response.status().is_success() {
            return Err(RemoteError::BadResponse {
                endpoint,
                status: response.status().as_u16(),
                message: None,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mixed_page_results() {
        let body = json!({
            "success": false,
            "pages": [
                {"pageNumber": 1, "records": [{"vendor": "ACME"}]},
                {"pageNumber": 3, "error": "unreadable"}
            ]
        });
        let response: ScanResponse = serde_json::from_value(body).unwrap();
        assert!(!response.success);
        assert!(response.pages[0].is_valid());
        assert!(!response.pages[1].is_valid());
        assert_eq!(response.pages[0].records.as_ref().unwrap()[0]["vendor"], json!("ACME"));
    }

    #[test]
    fn joins_page_numbers() {
        assert_eq!(join_pages(&[1, 3, 4]), "1,3,4");
        assert_eq!(join_pages(&[]), "");
    }
}
