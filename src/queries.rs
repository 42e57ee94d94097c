// Copyright 2025 Cowboy AI, LLC.

//! Read side over admitted transactions

use crate::errors::{IntakeError, IntakeResult};
use crate::persistence::{RecordFilter, StoreError, TransactionStore};
use crate::transaction::{TransactionId, TransactionRecord};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Aggregate figures for one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    /// Store the figures describe
    pub store_id: String,
    /// Number of admitted transactions
    pub total_transactions: u64,
    /// Sum of declared totals
    pub total_amount: Decimal,
    /// Mean transaction value, two decimal places
    pub average_amount: Decimal,
}

/// Mean of `total` over `count`, at scale 6 then banker's-rounded to scale 2
pub fn average_amount(total: Decimal, count: u64) -> Decimal {
    let mut average = match count {
        0 => Decimal::ZERO,
        _ => total
            .checked_div(Decimal::from(count))
            .map(|mean| {
                mean.round_dp_with_strategy(6, RoundingStrategy::MidpointNearestEven)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
            })
            .unwrap_or(Decimal::ZERO),
    };
    average.rescale(2);
    average
}

/// Lookups over the transaction store
#[derive(Clone)]
pub struct TransactionQueryService {
    store: Arc<dyn TransactionStore>,
}

impl TransactionQueryService {
    /// Create a query service over `store`
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self { store }
    }

    /// Fetch one transaction by business id; `None` if there is none
    pub async fn get_by_business_id(
        &self,
        raw_id: &str,
    ) -> IntakeResult<Option<TransactionRecord>> {
        let transaction_id = TransactionId::parse(raw_id)?;
        self.store
            .find_by_business_id(&transaction_id)
            .await
            .map_err(retrieval_error)
    }

    /// All transactions of a store, newest first
    pub async fn by_store(&self, store_id: &str) -> IntakeResult<Vec<TransactionRecord>> {
        self.list(RecordFilter::Store(store_id.to_string())).await
    }

    /// All transactions of a till, newest first
    pub async fn by_till(&self, till_id: &str) -> IntakeResult<Vec<TransactionRecord>> {
        self.list(RecordFilter::Till(till_id.to_string())).await
    }

    /// All transactions of a loyalty customer, newest first
    pub async fn by_customer(&self, customer_id: &str) -> IntakeResult<Vec<TransactionRecord>> {
        self.list(RecordFilter::Customer(customer_id.to_string())).await
    }

    /// Transactions rung up within `[start, end]`, newest first
    pub async fn by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> IntakeResult<Vec<TransactionRecord>> {
        if start > end {
            return Err(IntakeError::validation(
                "startDate",
                "Start date must not be after end date",
            ));
        }
        self.list(RecordFilter::DateRange { start, end }).await
    }

    /// Count, sum and mean of a store's transactions
    pub async fn store_statistics(&self, store_id: &str) -> IntakeResult<StoreStatistics> {
        let records = self.by_store(store_id).await?;
        let total_amount = records
            .iter()
            .try_fold(Decimal::ZERO, |sum, record| sum.checked_add(record.total_amount))
            .ok_or_else(|| IntakeError::processing("Store total amount is out of range"))?;
        let total_transactions = records.len() as u64;

        Ok(StoreStatistics {
            store_id: store_id.to_string(),
            total_transactions,
            total_amount,
            average_amount: average_amount(total_amount, total_transactions),
        })
    }

    async fn list(&self, filter: RecordFilter) -> IntakeResult<Vec<TransactionRecord>> {
        let records = self.store.list(&filter).await.map_err(retrieval_error)?;
        debug!(?filter, count = records.len(), "Listed transactions");
        Ok(records)
    }
}

fn retrieval_error(err: StoreError) -> IntakeError {
    IntakeError::processing(format!("Failed to retrieve transactions: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::TransactionAdmissionService;
    use crate::persistence::InMemoryTransactionStore;
    use crate::transaction::TransactionCommand;
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;
    use test_case::test_case;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn command(till: &str, customer: &str, minute: u32, total: &str) -> TransactionCommand {
        TransactionCommand {
            customer_id: Some(customer.into()),
            store_id: Some("S1".into()),
            till_id: Some(till.into()),
            payment_method: Some("cash".into()),
            total_amount: Some(dec(total)),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap()),
            ..Default::default()
        }
    }

    async fn seeded() -> TransactionQueryService {
        let store = Arc::new(InMemoryTransactionStore::new());
        let admission = TransactionAdmissionService::new(store.clone());
        for sent in [
            command("T1", "C1", 0, "10.00"),
            command("T1", "C2", 10, "5.00"),
            command("T2", "C1", 20, "2.50"),
        ] {
            admission.submit(sent).await.unwrap();
        }
        TransactionQueryService::new(store)
    }

    #[test_case("10.00", 3, "3.33")]
    #[test_case("0.05", 2, "0.02" ; "half even rounds down")]
    #[test_case("0.15", 2, "0.08" ; "half even rounds up")]
    #[test_case("0", 0, "0.00" ; "empty store")]
    fn test_average_amount(total: &str, count: u64, expected: &str) {
        let average = average_amount(dec(total), count);
        assert_eq!(average, dec(expected));
        assert_eq!(average.scale(), 2);
    }

    #[tokio::test]
    async fn test_lists_are_newest_first() {
        let queries = seeded().await;
        let store = queries.by_store("S1").await.unwrap();
        assert_eq!(store.len(), 3);
        assert!(store.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        assert_eq!(queries.by_till("T1").await.unwrap().len(), 2);
        let customer = queries.by_customer("C1").await.unwrap();
        assert_eq!(customer.len(), 2);
        assert_eq!(customer[0].till_id, "T2");
    }

    #[tokio::test]
    async fn test_date_range_is_inclusive() {
        let queries = seeded().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap();
        let found = queries
            .by_date_range(start, start + Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let err = queries
            .by_date_range(start, start - Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_store_statistics() {
        let queries = seeded().await;
        let stats = queries.store_statistics("S1").await.unwrap();
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.total_amount, dec("17.50"));
        assert_eq!(stats.average_amount, dec("5.83"));

        let empty = queries.store_statistics("S9").await.unwrap();
        assert_eq!(empty.total_transactions, 0);
        assert_eq!(empty.average_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_get_by_business_id() {
        let queries = seeded().await;
        let first = queries.by_store("S1").await.unwrap().remove(0);
        let found = queries
            .get_by_business_id(first.transaction_id.as_str())
            .await
            .unwrap();
        assert_eq!(found, Some(first));

        let missing = TransactionId::generate();
        assert_eq!(queries.get_by_business_id(missing.as_str()).await.unwrap(), None);
        assert!(queries.get_by_business_id("nope").await.is_err());
    }
}
