use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::{Config, RESERVABLE};
use crate::error::{AppError, Result};
use crate::types::{CourtSchedule, ScheduleResponse, SlotRecord, SlotSnapshot, TimeBlock};

/// Raw access to the per-date schedule endpoint.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    /// Fetch the schedule body for a single `YYYY-MM-DD` date.
    async fn fetch_day(&self, date: &str) -> Result<serde_json::Value>;
}

/// rec.us schedule API over HTTP.
pub struct HttpScheduleSource {
    client: reqwest::Client,
    cfg: Config,
    latency: Arc<LatencyStats>,
}

impl HttpScheduleSource {
    pub fn new(cfg: Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        Ok(Self { client, cfg, latency })
    }
}

#[async_trait]
impl ScheduleSource for HttpScheduleSource {
    async fn fetch_day(&self, date: &str) -> Result<serde_json::Value> {
        let url = self.cfg.schedule_url(date);
        let started = Instant::now();
        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        self.latency.record(started.elapsed());
        Ok(body)
    }
}

/// Result of fetching the whole polling window.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub snapshot: SlotSnapshot,
    /// Dates whose request or parse failed; they contribute no slots.
    pub failed_dates: Vec<String>,
}

pub struct SlotFetcher {
    source: Arc<dyn ScheduleSource>,
}

impl SlotFetcher {
    pub fn new(source: Arc<dyn ScheduleSource>) -> Self {
        Self { source }
    }

    /// Fetch every date concurrently and wait for all of them. A failed date is
    /// logged and skipped; the rest still make it into the snapshot, in date order.
    pub async fn fetch_window(&self, dates: &[NaiveDate]) -> FetchOutcome {
        let requests = dates.iter().map(|d| {
            let date = d.format("%Y-%m-%d").to_string();
            async move {
                let result = self.fetch_date(&date).await;
                (date, result)
            }
        });

        let mut records = Vec::new();
        let mut failed_dates = Vec::new();

        for (date, result) in join_all(requests).await {
            match result {
                Ok(slots) => {
                    debug!(date = %date, slots = slots.len(), "Fetched {} reservable slots for {date}", slots.len());
                    records.extend(slots);
                }
                Err(e) => {
                    warn!(date = %date, "Failed to fetch schedule for {date}: {e}");
                    failed_dates.push(date);
                }
            }
        }

        info!(
            dates = dates.len(),
            failed = failed_dates.len(),
            slots = records.len(),
            "Window fetch complete: {} slots across {} dates ({} failed)",
            records.len(),
            dates.len(),
            failed_dates.len(),
        );

        FetchOutcome {
            snapshot: SlotSnapshot::new(records),
            failed_dates,
        }
    }

    async fn fetch_date(&self, date: &str) -> Result<Vec<SlotRecord>> {
        let body = self.source.fetch_day(date).await?;
        parse_day_schedule(date, body)
    }
}

/// Contiguous run of `days` calendar dates starting at `today`.
pub fn polling_window(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    today.iter_days().take(days as usize).collect()
}

/// Extract the reservable slots from one schedule body.
///
/// The day is read from the key matching `requested`, falling back to the first
/// key in the response. Records carry the response's date key. Any deviation
/// from the expected shape is an `AppError::Schema`.
pub fn parse_day_schedule(requested: &str, body: serde_json::Value) -> Result<Vec<SlotRecord>> {
    let schema_err = |what: String| AppError::Schema(format!("schedule for {requested}: {what}"));

    let resp: ScheduleResponse =
        serde_json::from_value(body).map_err(|e| schema_err(e.to_string()))?;

    let mut dates = resp.dates;
    let (date_key, day) = match dates.remove(requested) {
        Some(day) => (requested.to_string(), day),
        None => dates
            .into_iter()
            .next()
            .ok_or_else(|| schema_err("response has no dates".to_string()))?,
    };

    let courts: Vec<CourtSchedule> =
        serde_json::from_value(day).map_err(|e| schema_err(format!("day {date_key}: {e}")))?;

    let mut slots = Vec::new();
    for court in courts {
        let court_id = court.court_number.to_string();
        let sport = court
            .sports
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        for (time, entry) in court.schedule {
            let block: TimeBlock = serde_json::from_value(entry)
                .map_err(|e| schema_err(format!("court {court_id} block {time}: {e}")))?;
            if block.reference_type.as_deref() == Some(RESERVABLE) {
                slots.push(SlotRecord {
                    date: date_key.clone(),
                    court: court_id.clone(),
                    sport: sport.clone(),
                    time,
                });
            }
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn day_body(date: &str) -> serde_json::Value {
        json!({
            "dates": {
                date: [
                    {
                        "courtNumber": 1,
                        "sports": [{ "name": "Tennis" }, { "name": "Pickleball" }],
                        "schedule": {
                            "18:00": { "referenceType": "RESERVABLE" },
                            "09:00": { "referenceType": "RESERVATION" },
                            "10:00": { "referenceType": "RESERVABLE" }
                        }
                    },
                    {
                        "courtNumber": "B",
                        "sports": [{ "name": "Basketball" }],
                        "schedule": {
                            "19:00": { "referenceType": "RESERVABLE" },
                            "20:00": { "referenceType": null }
                        }
                    }
                ]
            }
        })
    }

    struct FakeSource {
        failing: HashSet<String>,
    }

    #[async_trait]
    impl ScheduleSource for FakeSource {
        async fn fetch_day(&self, date: &str) -> Result<serde_json::Value> {
            if self.failing.contains(date) {
                return Err(AppError::Schema(format!("boom on {date}")));
            }
            Ok(day_body(date))
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn keeps_only_reservable_entries_in_response_order() {
        let slots = parse_day_schedule("2025-04-20", day_body("2025-04-20")).unwrap();
        let rendered: Vec<(&str, &str, &str)> = slots
            .iter()
            .map(|s| (s.court.as_str(), s.sport.as_str(), s.time.as_str()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("1", "Tennis, Pickleball", "18:00"),
                ("1", "Tennis, Pickleball", "10:00"),
                ("B", "Basketball", "19:00"),
            ]
        );
        assert!(slots.iter().all(|s| s.date == "2025-04-20"));
    }

    #[test]
    fn falls_back_to_first_date_key() {
        let slots = parse_day_schedule("2025-04-19", day_body("2025-04-20")).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].date, "2025-04-20");
    }

    #[test]
    fn shape_changes_are_reported() {
        let missing_sports = json!({
            "dates": { "2025-04-20": [{ "courtNumber": 1, "schedule": {} }] }
        });
        let err = parse_day_schedule("2025-04-20", missing_sports).unwrap_err();
        assert!(matches!(err, AppError::Schema(_)), "{err}");

        let no_dates = json!({ "dates": {} });
        assert!(matches!(
            parse_day_schedule("2025-04-20", no_dates),
            Err(AppError::Schema(_))
        ));

        let not_an_object = json!([1, 2, 3]);
        assert!(parse_day_schedule("2025-04-20", not_an_object).is_err());
    }

    #[test]
    fn window_spans_month_boundary() {
        let window = polling_window(date("2025-04-28"), 7);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0], date("2025-04-28"));
        assert_eq!(window[6], date("2025-05-04"));
    }

    #[tokio::test]
    async fn one_failing_date_does_not_sink_the_window() {
        let dates = polling_window(date("2025-04-20"), 7);
        let fetcher = SlotFetcher::new(Arc::new(FakeSource {
            failing: HashSet::from(["2025-04-22".to_string()]),
        }));

        let outcome = fetcher.fetch_window(&dates).await;

        assert_eq!(outcome.failed_dates, vec!["2025-04-22".to_string()]);
        assert_eq!(outcome.snapshot.len(), 6 * 3);
        let seen: Vec<&str> = outcome
            .snapshot
            .records()
            .iter()
            .map(|s| s.date.as_str())
            .collect();
        assert!(!seen.contains(&"2025-04-22"));
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted, "records must stay in date order");
    }
}
