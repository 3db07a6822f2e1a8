//! 额度账本客户端
//!
//! 账本是远程权威计数器，这里只发送扣除 / 退还的增量，并信任账本返回的新余额。
//! 同一操作员在多个会话中并发扣费属于已知的未防护竞争，不在此处理。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LedgerError;

/// 账本操作回执
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    /// 本次扣除或退还的页数
    pub pages: u32,
    /// 操作后的余额
    pub new_balance: i64,
}

/// 额度账本
#[async_trait]
pub trait CreditLedgerClient: Send + Sync {
    /// 读取余额、扣除并持久化
    async fn deduct(&self, user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError>;

    /// 读取余额、退还并持久化
    async fn refund(&self, user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LedgerRequest<'a> {
    user_id: &'a str,
    pages: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    balance: Option<i64>,
}

/// HTTP 账本客户端
pub struct HttpCreditLedger {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpCreditLedger {
    /// 创建新的账本客户端
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.ledger_api_base_url.trim_end_matches('/').to_string(),
            token: config.ledger_api_token.clone(),
        }
    }

    async fn post(&self, action: &str, user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError> {
        let endpoint = format!("{}/credits/{}", self.base_url, action);
        debug!("账本请求: {} pages={}", endpoint, pages);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&LedgerRequest { user_id, pages })
            .send()
            .await
            .map_err(|e| LedgerError::request_failed(&endpoint, e))?;

        let status = response.status();
        if status.is_success() {
            let receipt: LedgerReceipt = response
                .json()
                .await
                .map_err(|e| LedgerError::request_failed(&endpoint, e))?;
            debug!("账本回执: {:?}", receipt);
            return Ok(receipt);
        }

        let body: Option<LedgerErrorBody> = response.json().await.ok();
        let message = body.as_ref().and_then(|b| b.error.clone());
        warn!("账本返回错误: status={} message={:?}", status, message);

        if status == reqwest::StatusCode::PAYMENT_REQUIRED
            || message.as_deref() == Some("insufficient")
        {
            return Err(LedgerError::InsufficientCredits {
                requested: pages,
                balance: body.and_then(|b| b.balance),
            });
        }

        Err(LedgerError::BadResponse {
            endpoint,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl CreditLedgerClient for HttpCreditLedger {
    async fn deduct(&self, user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError> {
        self.post("deduct", user_id, pages).await
    }

    async fn refund(&self, user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError> {
        self.post("refund", user_id, pages).await
    }
}
