//! Daily 95th-percentile metering.
//!
//! Samples for one school and day are converted to bits/s, sorted in
//! descending order and the top 5% (rounded up, always leaving one sample)
//! is discarded. The next highest sample is the billed value.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::entities::{school, school_settlement, school_traffic};
use crate::error::{Result, SettlementError};
use crate::models::rates::SchoolFilter;
use crate::models::settlement::NewDailySettlement;
use crate::store::{DailySettlementStore, SchoolDirectory, TrafficSampleStore};

/// Samples discarded from the top of a day with `n` samples
pub fn exclude_count(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    // ceil(0.05 * n) in integer arithmetic
    n.div_ceil(20).min(n - 1)
}

/// bits/s for one sample
pub fn sample_metric(bytes_received: i64, bytes_sent: i64, interval_secs: i64) -> i64 {
    (bytes_received + bytes_sent) * 8 / interval_secs.max(1)
}

/// Selected (value, sample_time) for a day of samples, `None` when empty
pub fn select_percentile(
    samples: &[school_traffic::Model],
    interval_secs: i64,
) -> Option<(i64, NaiveDateTime)> {
    let mut metrics: Vec<(i64, NaiveDateTime)> = samples
        .iter()
        .map(|s| (sample_metric(s.total_recv, s.total_send, interval_secs), s.create_time))
        .collect();
    if metrics.is_empty() {
        return None;
    }
    metrics.sort_by(|a, b| b.0.cmp(&a.0));
    Some(metrics[exclude_count(metrics.len())])
}

/// `[date 00:00:00, date 23:59:59.999999999]`
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    (start, start + Duration::days(1) - Duration::nanoseconds(1))
}

#[derive(Clone)]
pub struct PercentileCalculator {
    samples: Arc<dyn TrafficSampleStore>,
    schools: Arc<dyn SchoolDirectory>,
    daily: Arc<dyn DailySettlementStore>,
    sample_interval_secs: i64,
    page_size: u64,
}

impl PercentileCalculator {
    pub fn new(
        samples: Arc<dyn TrafficSampleStore>,
        schools: Arc<dyn SchoolDirectory>,
        daily: Arc<dyn DailySettlementStore>,
        sample_interval_secs: i64,
        page_size: u64,
    ) -> Self {
        Self {
            samples,
            schools,
            daily,
            sample_interval_secs,
            page_size: page_size.max(1),
        }
    }

    /// Percentile for one (region, cp) pair of a school, `None` without samples
    pub async fn calculate_for_pair(
        &self,
        date: NaiveDate,
        school: &school::Model,
        region: &str,
        cp: &str,
    ) -> Result<Option<NewDailySettlement>> {
        let (day_start, day_end) = day_bounds(date);
        let samples = self
            .samples
            .samples(&school.school_id, day_start, day_end, Some(region), Some(cp))
            .await?;

        let Some((value, sample_time)) = select_percentile(&samples, self.sample_interval_secs)
        else {
            return Ok(None);
        };

        debug!(
            school_id = %school.school_id,
            region,
            cp,
            samples = samples.len(),
            value,
            "Selected daily percentile"
        );

        Ok(Some(NewDailySettlement {
            school_id: school.school_id.clone(),
            school_name: school.school_name.clone(),
            region: region.to_string(),
            cp: cp.to_string(),
            value,
            sample_time,
            date,
        }))
    }

    /// Percentile rows for one school and day.
    ///
    /// With `region`/`cp` the lookup and the written row are pinned to them.
    /// Otherwise every pair observed that day is computed, falling back to the
    /// school's registered pair when the day has no samples at all.
    pub async fn calculate_daily(
        &self,
        date: NaiveDate,
        school_id: &str,
        region: Option<&str>,
        cp: Option<&str>,
    ) -> Result<Vec<school_settlement::Model>> {
        let school = self
            .schools
            .school(school_id, region, cp)
            .await?
            .ok_or_else(|| SettlementError::not_found(format!("school {}", school_id)))?;

        if region.is_some() || cp.is_some() {
            let region = region.unwrap_or(school.region.as_str());
            let cp = cp.unwrap_or(school.cp.as_str());
            let value = self
                .calculate_for_pair(date, &school, region, cp)
                .await?
                .ok_or_else(|| no_samples(school_id, date))?;
            return Ok(vec![self.daily.upsert_daily(value).await?]);
        }

        let (day_start, day_end) = day_bounds(date);
        let observed: BTreeSet<(String, String)> = self
            .samples
            .samples(school_id, day_start, day_end, None, None)
            .await?
            .into_iter()
            .map(|s| (s.region, s.cp))
            .collect();

        if observed.is_empty() {
            if school.region.is_empty() || school.cp.is_empty() {
                return Err(SettlementError::not_found(format!(
                    "school {} has no samples on {} and no registered region/cp",
                    school_id, date
                )));
            }
            let value = self
                .calculate_for_pair(date, &school, &school.region, &school.cp)
                .await?
                .ok_or_else(|| no_samples(school_id, date))?;
            return Ok(vec![self.daily.upsert_daily(value).await?]);
        }

        let mut rows = Vec::with_capacity(observed.len());
        for (region, cp) in &observed {
            match self.calculate_for_pair(date, &school, region, cp).await? {
                Some(value) => rows.push(self.daily.upsert_daily(value).await?),
                None => warn!(school_id, %region, %cp, %date, "No samples for pair, skipping"),
            }
        }
        Ok(rows)
    }

    /// Every school in the directory for one day; returns rows written.
    /// Schools without data are skipped. Any other failure aborts the batch.
    pub async fn calculate_all_schools(&self, date: NaiveDate) -> Result<usize> {
        let filter = SchoolFilter::default();
        let mut offset = 0;
        let mut written = 0;
        let mut skipped = 0;

        loop {
            let (page, total) = self.schools.schools(&filter, self.page_size, offset).await?;
            if page.is_empty() {
                break;
            }
            for school in &page {
                match self.calculate_daily(date, &school.school_id, None, None).await {
                    Ok(rows) => written += rows.len(),
                    Err(SettlementError::NotFound(reason)) => {
                        skipped += 1;
                        debug!(school_id = %school.school_id, %date, %reason, "School skipped");
                    }
                    Err(e) => {
                        warn!(school_id = %school.school_id, %date, written, error = %e, "Daily percentile run aborted");
                        return Err(e);
                    }
                }
            }
            offset += page.len() as u64;
            if offset >= total {
                break;
            }
        }

        info!(%date, written, skipped, "Daily percentile run complete");
        Ok(written)
    }
}

fn no_samples(school_id: &str, date: NaiveDate) -> SettlementError {
    SettlementError::not_found(format!("no traffic samples for school {} on {}", school_id, date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::models::settlement::{AggregatedFlow, DailySettlementFilter};
    use crate::store::memory::SampleSeed;
    use crate::store::MemoryStore;

    /// Daily store whose writes always fail
    struct FullDisk;

    #[async_trait]
    impl DailySettlementStore for FullDisk {
        async fn upsert_daily(&self, _: NewDailySettlement) -> Result<school_settlement::Model> {
            Err(SettlementError::Persistence("disk full".to_string()))
        }

        async fn list_daily(
            &self,
            _: &DailySettlementFilter,
        ) -> Result<Vec<school_settlement::Model>> {
            Ok(Vec::new())
        }

        async fn aggregate_flows(&self, _: &DailySettlementFilter) -> Result<Vec<AggregatedFlow>> {
            Ok(Vec::new())
        }
    }

    fn sample(metric_bytes: i64, minute: u32) -> school_traffic::Model {
        school_traffic::Model {
            id: minute as i64,
            create_time: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_hms_opt(0, minute, 0)
                .unwrap(),
            school_id: "s1".into(),
            school_name: "School".into(),
            region: "east".into(),
            cp: "telecom".into(),
            total_recv: metric_bytes,
            total_send: 0,
        }
    }

    #[test]
    fn test_exclude_count() {
        assert_eq!(exclude_count(0), 0);
        assert_eq!(exclude_count(1), 0);
        assert_eq!(exclude_count(10), 1);
        assert_eq!(exclude_count(20), 1);
        assert_eq!(exclude_count(21), 2);
        assert_eq!(exclude_count(288), 15);
    }

    #[test]
    fn test_sample_metric() {
        assert_eq!(sample_metric(300, 0, 300), 8);
        // integer division
        assert_eq!(sample_metric(100, 0, 300), 2);
    }

    #[test]
    fn test_ten_samples_selects_second_highest() {
        // interval 8 makes metric == bytes
        let samples: Vec<_> = (1..=10).map(|i| sample(i * 10, i as u32)).collect();
        let (value, at) = select_percentile(&samples, 8).unwrap();
        assert_eq!(value, 90);
        assert_eq!(at, samples[8].create_time);
    }

    #[test]
    fn test_single_sample() {
        let samples = vec![sample(40, 5)];
        assert_eq!(select_percentile(&samples, 8).map(|v| v.0), Some(40));
        assert_eq!(select_percentile(&[], 8), None);
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(start.to_string(), "2025-03-01 00:00:00");
        assert_eq!(end.to_string(), "2025-03-01 23:59:59.999999999");
    }

    #[tokio::test]
    async fn test_all_schools_propagates_persistence_error() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        for school_id in ["s1", "s2"] {
            store.add_school(school_id, school_id, "east", "telecom");
            store.add_sample(SampleSeed {
                school_id,
                school_name: school_id,
                region: "east",
                cp: "telecom",
                at: date.and_hms_opt(1, 0, 0).unwrap(),
                bytes_received: 80,
                bytes_sent: 0,
            });
        }
        let calculator = PercentileCalculator::new(store.clone(), store, Arc::new(FullDisk), 8, 10);

        let err = calculator.calculate_all_schools(date).await.unwrap_err();
        assert!(matches!(err, SettlementError::Persistence(ref m) if m == "disk full"));
    }

    #[tokio::test]
    async fn test_all_schools_skips_schools_without_samples() {
        let store = Arc::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        store.add_school("s1", "s1", "east", "telecom");
        store.add_school("s2", "s2", "east", "telecom");
        store.add_sample(SampleSeed {
            school_id: "s2",
            school_name: "s2",
            region: "east",
            cp: "telecom",
            at: date.and_hms_opt(1, 0, 0).unwrap(),
            bytes_received: 80,
            bytes_sent: 0,
        });
        let calculator =
            PercentileCalculator::new(store.clone(), store.clone(), store.clone(), 8, 1);

        assert_eq!(calculator.calculate_all_schools(date).await.unwrap(), 1);
        assert_eq!(store.daily_rows().len(), 1);
    }
}
