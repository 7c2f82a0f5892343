//! Normalized transaction handed to the ledger by the transaction feed.

use crate::domain::{Asset, Decimal, Exchange, LotSource, Side, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Largest accepted absolute amount.
pub const MAX_QUANTITY: i64 = 10_000_000_000_000_000;
/// Largest accepted USD price per unit. Together with `MAX_QUANTITY` this keeps
/// a single transaction's value below 1e28.
pub const MAX_UNIT_PRICE: i64 = 1_000_000_000_000;

/// Kind of balance-changing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Trade,
    Transfer,
    Interest,
    Fee,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Trade => "trade",
            TransactionType::Transfer => "transfer",
            TransactionType::Interest => "interest",
            TransactionType::Fee => "fee",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionType> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "trade" => Some(TransactionType::Trade),
            "transfer" => Some(TransactionType::Transfer),
            "interest" => Some(TransactionType::Interest),
            "fee" => Some(TransactionType::Fee),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the ledger does with a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    /// Open a new lot.
    Acquire(LotSource),
    /// Consume lots FIFO and realize a gain.
    Dispose,
    /// No effect on cost basis (transfers, fees, trades without a side).
    Ignore,
}

/// An immutable, already-normalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Stable id derived from `(exchange, external_id)`.
    pub id: String,
    pub user_id: UserId,
    pub exchange: Exchange,
    /// Identifier assigned by the exchange, importer or manual-entry form.
    pub external_id: String,
    pub asset: Asset,
    /// Signed magnitude; the ledger uses the absolute value.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    /// USD per unit when known (trades); absent or zero otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub timestamp: TimeMs,
}

/// Whether `price` is within `[-MAX_UNIT_PRICE, MAX_UNIT_PRICE]`.
pub fn unit_price_in_range(price: Decimal) -> bool {
    price.abs() <= Decimal::from_i64(MAX_UNIT_PRICE)
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        exchange: Exchange,
        external_id: impl Into<String>,
        asset: Asset,
        amount: Decimal,
        tx_type: TransactionType,
        side: Option<Side>,
        price: Option<Decimal>,
        timestamp: TimeMs,
    ) -> Self {
        let external_id = external_id.into();
        let id = Self::compute_id(&exchange, &external_id);
        Transaction {
            id,
            user_id,
            exchange,
            external_id,
            asset,
            amount,
            tx_type,
            side,
            price,
            timestamp,
        }
    }

    /// Deterministic id, unique per exchange + external id.
    pub fn compute_id(exchange: &Exchange, external_id: &str) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, exchange.as_str());
        hash_var(&mut hasher, external_id.trim());
        let hash = hasher.finalize();
        format!("tx:{}", hex::encode(&hash[..16]))
    }

    /// Quantity the ledger acts on.
    pub fn quantity(&self) -> Decimal {
        self.amount.abs()
    }

    /// Explicit per-unit price, if present and non-zero.
    pub fn explicit_price(&self) -> Option<Decimal> {
        self.price.filter(|p| !p.is_zero())
    }

    /// Why the amount or explicit price is out of range, if it is.
    pub fn magnitude_violation(&self) -> Option<&'static str> {
        if self.quantity() > Decimal::from_i64(MAX_QUANTITY) {
            return Some("amount exceeds the accepted range");
        }
        match self.price {
            Some(p) if !unit_price_in_range(p) => Some("price exceeds the accepted range"),
            _ => None,
        }
    }

    /// Classify the transaction. Exhaustive over type and side.
    pub fn classify(&self) -> LedgerAction {
        match (self.tx_type, self.side) {
            (TransactionType::Deposit, _) => LedgerAction::Acquire(LotSource::Deposit),
            (TransactionType::Interest, _) => LedgerAction::Acquire(LotSource::Interest),
            (TransactionType::Trade, Some(Side::Buy)) => LedgerAction::Acquire(LotSource::Buy),
            (TransactionType::Trade, Some(Side::Sell)) => LedgerAction::Dispose,
            (TransactionType::Withdrawal, _) => LedgerAction::Dispose,
            (TransactionType::Trade, None) => LedgerAction::Ignore,
            (TransactionType::Transfer, _) => LedgerAction::Ignore,
            (TransactionType::Fee, _) => LedgerAction::Ignore,
        }
    }

    pub fn is_acquisition(&self) -> bool {
        matches!(self.classify(), LedgerAction::Acquire(_))
    }

    pub fn is_disposal(&self) -> bool {
        self.classify() == LedgerAction::Dispose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(tx_type: TransactionType, side: Option<Side>) -> Transaction {
        Transaction::new(
            UserId::new("u1"),
            Exchange::new("coinbase"),
            "ext-1",
            Asset::new("BTC"),
            Decimal::from_str_canonical("-0.5").unwrap(),
            tx_type,
            side,
            None,
            TimeMs::new(1_000),
        )
    }

    #[test]
    fn classification_matches_type_and_side() {
        assert_eq!(
            tx(TransactionType::Deposit, None).classify(),
            LedgerAction::Acquire(LotSource::Deposit)
        );
        assert_eq!(
            tx(TransactionType::Interest, None).classify(),
            LedgerAction::Acquire(LotSource::Interest)
        );
        assert_eq!(
            tx(TransactionType::Trade, Some(Side::Buy)).classify(),
            LedgerAction::Acquire(LotSource::Buy)
        );
        assert_eq!(
            tx(TransactionType::Trade, Some(Side::Sell)).classify(),
            LedgerAction::Dispose
        );
        assert_eq!(
            tx(TransactionType::Withdrawal, None).classify(),
            LedgerAction::Dispose
        );
    }

    #[test]
    fn transfers_fees_and_sideless_trades_are_ignored() {
        for t in [
            tx(TransactionType::Transfer, None),
            tx(TransactionType::Fee, None),
            tx(TransactionType::Trade, None),
        ] {
            assert_eq!(t.classify(), LedgerAction::Ignore);
            assert!(!t.is_acquisition());
            assert!(!t.is_disposal());
        }
    }

    #[test]
    fn quantity_uses_absolute_amount() {
        let t = tx(TransactionType::Withdrawal, None);
        assert_eq!(t.quantity(), Decimal::from_str_canonical("0.5").unwrap());
    }

    #[test]
    fn zero_price_is_not_explicit() {
        let mut t = tx(TransactionType::Trade, Some(Side::Buy));
        t.price = Some(Decimal::zero());
        assert_eq!(t.explicit_price(), None);
        t.price = Some(Decimal::from_i64(100));
        assert_eq!(t.explicit_price(), Some(Decimal::from_i64(100)));
    }

    #[test]
    fn magnitude_limits_cover_amount_and_price() {
        let mut t = tx(TransactionType::Deposit, None);
        assert_eq!(t.magnitude_violation(), None);

        t.amount = -Decimal::from_i64(MAX_QUANTITY);
        assert_eq!(t.magnitude_violation(), None);
        t.amount = Decimal::from_str_canonical("10000000000000000000000000000").unwrap();
        assert_eq!(t.magnitude_violation(), Some("amount exceeds the accepted range"));

        t.amount = Decimal::one();
        t.price = Some(Decimal::from_i64(MAX_UNIT_PRICE) + Decimal::one());
        assert_eq!(t.magnitude_violation(), Some("price exceeds the accepted range"));
        assert!(unit_price_in_range(Decimal::from_i64(MAX_UNIT_PRICE)));
    }

    #[test]
    fn id_depends_on_exchange_and_external_id() {
        let a = Transaction::compute_id(&Exchange::new("binance"), "42");
        let b = Transaction::compute_id(&Exchange::new("binance"), "42");
        let c = Transaction::compute_id(&Exchange::new("kraken"), "42");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("tx:"));
        assert_eq!(a.len(), 3 + 32);
    }

    #[test]
    fn json_uses_type_field_and_camel_case() {
        let t = tx(TransactionType::Trade, Some(Side::Sell));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["side"], "sell");
        assert_eq!(json["userId"], "u1");
        assert!(json.get("price").is_none());
    }
}
