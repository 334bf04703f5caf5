use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kosh_common::model::TxKind;
use kosh_common::{CoreError, Paise, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDecision {
    Allowed,
    Flagged,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskContext {
    pub user_id: Uuid,
    pub kind: TxKind,
    pub amount: Paise,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
}

/// Advisory risk consultation. The orchestrator decides the outage posture:
/// an evaluation error fails closed at or above the high-value threshold and
/// open below it.
#[async_trait]
pub trait RiskGate: Send + Sync {
    async fn evaluate(&self, ctx: &RiskContext) -> Result<RiskDecision>;
}

/// Calls the external risk component over HTTP.
pub struct HttpRiskGate {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RiskResponse {
    decision: RiskDecision,
}

impl HttpRiskGate {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl RiskGate for HttpRiskGate {
    async fn evaluate(&self, ctx: &RiskContext) -> Result<RiskDecision> {
        let url = format!("{}/api/v1/evaluate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(ctx)
            .send()
            .await
            .map_err(|e| CoreError::internal(format!("risk service unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::internal(format!(
                "risk service returned {}",
                response.status()
            )));
        }
        let body: RiskResponse = response
            .json()
            .await
            .map_err(|e| CoreError::internal(format!("risk response malformed: {e}")))?;
        Ok(body.decision)
    }
}

/// Local gate for development and tests: allows everything.
pub struct PermissiveRiskGate;

#[async_trait]
impl RiskGate for PermissiveRiskGate {
    async fn evaluate(&self, _ctx: &RiskContext) -> Result<RiskDecision> {
        Ok(RiskDecision::Allowed)
    }
}

/// Test gate with a fixed script.
pub struct StaticRiskGate(pub Result<RiskDecision>);

#[async_trait]
impl RiskGate for StaticRiskGate {
    async fn evaluate(&self, _ctx: &RiskContext) -> Result<RiskDecision> {
        match &self.0 {
            Ok(d) => Ok(*d),
            Err(_) => Err(CoreError::internal("risk service unavailable")),
        }
    }
}
