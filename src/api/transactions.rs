use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::params::parse_user;
use super::AppState;
use crate::domain::{
    Asset, CostBasisLot, Decimal, Exchange, RealizedGainRecord, Side, TimeMs, Transaction,
    TransactionType,
};
use crate::engine::LedgerOutcome;
use crate::error::AppError;
use crate::orchestration::IngestOutcome;

/// Normalized transaction as posted by the feed. Decimals are strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub user_id: String,
    pub exchange: String,
    pub external_id: String,
    pub asset: String,
    pub amount: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub side: Option<String>,
    pub price: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub transaction_id: String,
    /// `processed` or `duplicate`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lot: Option<CostBasisLot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_gain: Option<RealizedGainRecord>,
}

impl TransactionRequest {
    fn into_transaction(self) -> Result<Transaction, AppError> {
        let user_id = parse_user(&self.user_id)?;
        let exchange = required("exchange", &self.exchange)?;
        let external_id = required("externalId", &self.external_id)?;
        let asset = required("asset", &self.asset)?;

        let amount = Decimal::from_str_canonical(&self.amount)
            .map_err(|_| AppError::BadRequest("Invalid amount".to_string()))?;
        let tx_type = TransactionType::parse(self.tx_type.trim())
            .ok_or_else(|| AppError::BadRequest(format!("Unknown type {}", self.tx_type)))?;
        let side = self
            .side
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Side::parse(s).ok_or_else(|| AppError::BadRequest(format!("Unknown side {}", s))))
            .transpose()?;
        let price = self
            .price
            .as_deref()
            .map(Decimal::from_str_canonical)
            .transpose()
            .map_err(|_| AppError::BadRequest("Invalid price".to_string()))?;
        if price.map(|p| p.is_negative()).unwrap_or(false) {
            return Err(AppError::BadRequest("price must be >= 0".to_string()));
        }

        let tx = Transaction::new(
            user_id,
            Exchange::new(exchange),
            external_id,
            Asset::new(asset),
            amount,
            tx_type,
            side,
            price,
            TimeMs::new(self.timestamp),
        );
        if let Some(reason) = tx.magnitude_violation() {
            return Err(AppError::BadRequest(reason.to_string()));
        }
        Ok(tx)
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed)
}

pub async fn post_transaction(
    State(state): State<AppState>,
    Json(body): Json<TransactionRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let tx = body.into_transaction()?;
    let outcome = state.ingestor.ingest(&tx).await?;

    let mut response = TransactionResponse {
        transaction_id: tx.id.clone(),
        status: "processed",
        lot: None,
        realized_gain: None,
    };
    let status = match outcome {
        IngestOutcome::Duplicate => {
            response.status = "duplicate";
            StatusCode::OK
        }
        IngestOutcome::Processed(LedgerOutcome::LotCreated(lot)) => {
            response.lot = Some(lot);
            StatusCode::CREATED
        }
        IngestOutcome::Processed(LedgerOutcome::GainRealized(record)) => {
            response.realized_gain = Some(record);
            StatusCode::CREATED
        }
        IngestOutcome::Processed(LedgerOutcome::Ignored) => StatusCode::CREATED,
    };

    Ok((status, Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransactionRequest {
        TransactionRequest {
            user_id: "u1".to_string(),
            exchange: "Binance".to_string(),
            external_id: "abc".to_string(),
            asset: "btc".to_string(),
            amount: "1.5".to_string(),
            tx_type: "trade".to_string(),
            side: Some("buy".to_string()),
            price: Some("20000".to_string()),
            timestamp: 1_000,
        }
    }

    #[test]
    fn converts_valid_request() {
        let tx = request().into_transaction().unwrap();
        assert_eq!(tx.asset, Asset::new("BTC"));
        assert_eq!(tx.exchange.as_str(), "binance");
        assert_eq!(tx.side, Some(Side::Buy));
        assert_eq!(tx.id, Transaction::compute_id(&Exchange::new("binance"), "abc"));
    }

    #[test]
    fn rejects_bad_fields() {
        let mut r = request();
        r.amount = "lots".to_string();
        assert!(r.into_transaction().is_err());

        let mut r = request();
        r.tx_type = "airdrop".to_string();
        assert!(r.into_transaction().is_err());

        let mut r = request();
        r.side = Some("hold".to_string());
        assert!(r.into_transaction().is_err());

        let mut r = request();
        r.external_id = " ".to_string();
        assert!(r.into_transaction().is_err());

        let mut r = request();
        r.price = Some("-1".to_string());
        assert!(r.into_transaction().is_err());
    }

    #[test]
    fn rejects_out_of_range_amount_and_price() {
        let mut r = request();
        r.amount = "10000000000000000000000000000".to_string();
        assert!(matches!(r.into_transaction(), Err(AppError::BadRequest(_))));

        let mut r = request();
        r.price = Some("1000000000000000000".to_string());
        assert!(matches!(r.into_transaction(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn empty_side_is_none() {
        let mut r = request();
        r.side = Some(String::new());
        assert_eq!(r.into_transaction().unwrap().side, None);
    }
}
