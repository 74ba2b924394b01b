// ============================================================================
// EXTERNAL PAYMENT GATEWAY
// ============================================================================
//
// The gateway performs the actual crypto transfer. From the core's point of
// view it is an opaque, possibly-failing, NON-IDEMPOTENT action: calling it
// twice may pay twice, and a timeout leaves the outcome unknown. The
// three-valued TransferOutcome keeps "ambiguous" distinct from "failed" so
// callers can never treat a timed-out transfer as safely refundable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::model::Destination;

/// Result of a transfer attempt. `Ambiguous` means the call was dispatched
/// but no confirmation arrived - the transfer may or may not have landed.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Success { reference: String },
    Failure { reason: String },
    Ambiguous,
}

/// Abstract payment gateway. Implementations must treat every call as a
/// fresh, irreversible payment attempt; retry logic lives nowhere.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn transfer(&self, destination: &Destination, amount: f64, memo: &str)
        -> TransferOutcome;
}

// ============================================================================
// HTTP GATEWAY CLIENT
// ============================================================================

#[derive(Deserialize)]
struct GatewayResponse {
    success: bool,
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Gateway client speaking a simple JSON transfer API.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: config.gateway_url.clone(),
            api_key: config.gateway_api_key.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn transfer(
        &self,
        destination: &Destination,
        amount: f64,
        memo: &str,
    ) -> TransferOutcome {
        let body = serde_json::json!({
            "method": destination.method,
            "address": destination.address,
            "amount": amount,
            "memo": memo,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            // Connection refused before the request left: nothing was paid
            Err(e) if e.is_connect() => {
                warn!(error = %e, "Gateway unreachable");
                return TransferOutcome::Failure {
                    reason: "gateway unreachable".to_string(),
                };
            }
            // Timeout or dropped connection after dispatch: outcome unknown
            Err(e) => {
                error!(error = %e, "Gateway call did not complete");
                return TransferOutcome::Ambiguous;
            }
        };

        let status = response.status();
        if status.is_client_error() {
            return TransferOutcome::Failure {
                reason: format!("gateway rejected transfer ({})", status),
            };
        }
        // 5xx: the gateway may have executed the transfer before failing
        if status.is_server_error() {
            error!(status = %status, "Gateway returned server error");
            return TransferOutcome::Ambiguous;
        }

        match response.json::<GatewayResponse>().await {
            Ok(parsed) if parsed.success => {
                let reference = parsed.tx_id.unwrap_or_default();
                info!(reference = %reference, amount = amount, "Transfer confirmed");
                TransferOutcome::Success { reference }
            }
            Ok(parsed) => TransferOutcome::Failure {
                reason: parsed.error.unwrap_or_else(|| "transfer declined".to_string()),
            },
            // 2xx with an unreadable body: do not assume either way
            Err(e) => {
                error!(error = %e, "Unparseable gateway response");
                TransferOutcome::Ambiguous
            }
        }
    }
}
