//! Operator-managed customer rates.
//!
//! Rows are keyed by (region, cp, school_name). Setting `fee_mode` to
//! "configed" here is what shields a row's fee columns from rate sync, and
//! setting it back to "auto" hands them to sync again.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::entities::rate_customer;
use crate::error::{Result, SettlementError};
use crate::models::rates::{
    CustomerRatePage, CustomerRateQuery, CustomerRateUpsert, FeeMode, NewRateCustomer,
};
use crate::store::RateStore;

#[derive(Clone)]
pub struct CustomerRateService {
    rates: Arc<dyn RateStore>,
}

impl CustomerRateService {
    pub fn new(rates: Arc<dyn RateStore>) -> Self {
        Self { rates }
    }

    pub async fn list(&self, query: CustomerRateQuery) -> Result<CustomerRatePage> {
        let (filter, limit, offset) = query.into_filter();
        let (items, total) = self
            .rates
            .list_customer_rates(&filter, limit, offset)
            .await?;
        Ok(CustomerRatePage { items, total })
    }

    /// Insert the row, or patch the existing one for the same key.
    /// New rows default to "auto".
    pub async fn upsert(&self, input: CustomerRateUpsert) -> Result<rate_customer::Model> {
        let (region, cp, school_name, patch) = input.validate()?;

        if let Some(existing) = self
            .rates
            .find_customer_rate(&region, &cp, &school_name)
            .await?
        {
            let fee_mode = patch.fee_mode;
            self.rates.update_customer_rate(existing.id, patch).await?;
            info!(rate_id = existing.id, %region, %cp, %school_name, fee_mode = ?fee_mode, "Customer rate updated");
            return self
                .rates
                .find_customer_rate(&region, &cp, &school_name)
                .await?
                .ok_or_else(|| SettlementError::not_found(format!("rate_customer {}", existing.id)));
        }

        let row = self
            .rates
            .insert_customer_rate(NewRateCustomer {
                region,
                cp,
                school_name,
                customer_fee: patch.customer_fee,
                network_line_fee: patch.network_line_fee,
                general_fee: patch.general_fee,
                fee_mode: patch.fee_mode.unwrap_or(FeeMode::Auto),
                extra: patch.extra.unwrap_or_else(|| json!({})),
                last_sync_time: None,
                last_sync_rule_id: None,
            })
            .await?;
        info!(rate_id = row.id, region = %row.region, cp = %row.cp, school_name = %row.school_name, fee_mode = %row.fee_mode, "Customer rate created");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn upsert(customer_fee: Option<f64>, fee_mode: Option<&str>) -> CustomerRateUpsert {
        CustomerRateUpsert {
            region: "east".into(),
            cp: "telecom".into(),
            school_name: "School A".into(),
            customer_fee,
            fee_mode: fee_mode.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_patches() {
        let store = Arc::new(MemoryStore::new());
        let service = CustomerRateService::new(store.clone());

        let created = service.upsert(upsert(Some(5.0), None)).await.unwrap();
        assert_eq!(created.fee_mode, "auto");
        assert_eq!(created.extra, json!({}));

        let updated = service
            .upsert(upsert(None, Some("configed")))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.fee_mode, "configed");
        // absent fee leaves the stored one
        assert_eq!(updated.customer_fee, Some(5.0));
        assert_eq!(store.rate_rows().len(), 1);

        let back = service.upsert(upsert(None, Some("auto"))).await.unwrap();
        assert_eq!(back.fee_mode, "auto");
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = Arc::new(MemoryStore::new());
        let service = CustomerRateService::new(store);
        for name in ["a", "b", "c"] {
            let mut input = upsert(Some(1.0), None);
            input.school_name = name.into();
            service.upsert(input).await.unwrap();
        }
        let mut other = upsert(Some(1.0), None);
        other.region = "west".into();
        service.upsert(other).await.unwrap();

        let page = service
            .list(CustomerRateQuery {
                region: Some("east".into()),
                page: Some(1),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        // most recently written first
        assert_eq!(page.items[0].school_name, "c");

        let exact = service
            .list(CustomerRateQuery {
                school_name: Some("b".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(exact.total, 1);
    }
}
