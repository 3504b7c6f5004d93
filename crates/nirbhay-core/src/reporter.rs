// SPDX-License-Identifier: AGPL-3.0
// Nirbhay Core - Ledger incident reporting
//
// The flush routine treats the reporter as an opaque collaborator: it hands
// over coordinates and a ledger flag and gets back a transaction id.

use crate::types::{AppError, AppSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Upstream delivery seam for incident reports.
///
/// Implementations deliver one incident to the selected distributed ledger
/// and return its transaction identifier.
#[async_trait]
pub trait IncidentReporter: Send + Sync {
    async fn report_incident(
        &self,
        lat: f64,
        lng: f64,
        evidence_hash: Option<&str>,
        use_algorand: bool,
    ) -> Result<String, AppError>;
}

/// Incident payload posted to the ledger gateway
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentPayload {
    pub geo_hash: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_hash: Option<String>,
    pub device_name: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayResponse {
    tx_hash: String,
}

/// HTTP gateway reporter: posts incident payloads to the per-ledger endpoint
/// and returns the transaction hash from the response.
#[derive(Debug)]
pub struct LedgerGateway {
    client: reqwest::Client,
    settings: AppSettings,
}

impl LedgerGateway {
    pub fn new(settings: AppSettings) -> Result<Self, AppError> {
        if settings.ethereum_gateway.is_empty() || settings.algorand_gateway.is_empty() {
            return Err(AppError::InvalidConfig(
                "Ledger gateway URL must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            settings,
        })
    }

    fn payload(&self, lat: f64, lng: f64, evidence_hash: Option<&str>) -> IncidentPayload {
        IncidentPayload {
            geo_hash: geo_hash(lat, lng),
            lat,
            lng,
            evidence_hash: evidence_hash.map(str::to_string),
            device_name: self.settings.device_name.clone(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Coordinate pair formatted to six decimal places, the on-chain geo key
pub fn geo_hash(lat: f64, lng: f64) -> String {
    format!("{:.6},{:.6}", lat, lng)
}

#[async_trait]
impl IncidentReporter for LedgerGateway {
    async fn report_incident(
        &self,
        lat: f64,
        lng: f64,
        evidence_hash: Option<&str>,
        use_algorand: bool,
    ) -> Result<String, AppError> {
        let url = self.settings.gateway_for(use_algorand);
        let payload = self.payload(lat, lng, evidence_hash);

        tracing::debug!("Reporting incident {} to {}", payload.geo_hash, url);

        let response = self.client.post(url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Delivery(format!(
                "Gateway returned {}",
                response.status()
            )));
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("Malformed gateway response: {}", e)))?;

        Ok(body.tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_hash_six_decimals() {
        assert_eq!(geo_hash(28.6139, 77.209), "28.613900,77.209000");
        assert_eq!(geo_hash(-1.5, 103.123456789), "-1.500000,103.123457");
    }

    #[test]
    fn test_payload_shape() {
        let gateway = LedgerGateway::new(AppSettings {
            device_name: "test-device".to_string(),
            ..AppSettings::default()
        })
        .unwrap();

        let payload = gateway.payload(28.6, 77.2, Some("abc123"));
        assert_eq!(payload.geo_hash, "28.600000,77.200000");
        assert_eq!(payload.device_name, "test-device");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["evidenceHash"], "abc123");
        assert!(json["createdAt"].is_i64());
    }

    #[test]
    fn test_payload_omits_absent_evidence_hash() {
        let gateway = LedgerGateway::new(AppSettings::default()).unwrap();
        let json = serde_json::to_value(gateway.payload(28.6, 77.2, None)).unwrap();
        assert!(json.get("evidenceHash").is_none());
    }

    #[test]
    fn test_empty_gateway_url_is_rejected() {
        let settings = AppSettings {
            ethereum_gateway: String::new(),
            ..AppSettings::default()
        };
        let err = LedgerGateway::new(settings).unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
    }
}
