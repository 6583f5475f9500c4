use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{RegionConfig, StudyConfig, StudyWindow, WeatherConfig};
use crate::error::{PipelineError, Result};
use crate::weather::archive::{ArchiveError, ArchiveSource, DateSpan, GeoPoint};
use crate::weather::normalize::{localize, merge_chunks};
use crate::weather::{UtcObservation, WeatherObservation, WeatherTable};

/// Retrieves complete local-hour weather series from an [`ArchiveSource`].
///
/// A region's UTC span is split into sub-windows that are fetched as
/// independent tasks, at most `concurrency` at a time, and joined back in
/// sub-window order.
pub struct WeatherFetcher<S> {
    source: Arc<S>,
    settings: WeatherConfig,
}

impl<S: ArchiveSource + 'static> WeatherFetcher<S> {
    pub fn new(source: S, settings: WeatherConfig) -> Self {
        Self {
            source: Arc::new(source),
            settings,
        }
    }

    #[tracing::instrument(skip(self, region, tz), fields(region = %region.name, window = %window.tag))]
    pub async fn fetch_region(
        &self,
        region: &RegionConfig,
        tz: Tz,
        window: &StudyWindow,
    ) -> Result<Vec<WeatherObservation>> {
        let span = DateSpan::new(window.start_date, window.end_date).widen(1);
        let chunks = span.split(self.settings.max_days_per_request);
        let point = GeoPoint {
            latitude: region.latitude,
            longitude: region.longitude,
        };
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let retries = self.settings.retries;
        let backoff = Duration::from_millis(self.settings.retry_backoff_ms);

        info!(span = %span, requests = chunks.len(), "Requesting hourly weather");

        let tasks: Vec<_> = chunks
            .iter()
            .map(|&chunk| {
                let source = Arc::clone(&self.source);
                let sem = Arc::clone(&semaphore);
                tokio::spawn(async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| ArchiveError::Rejected(e.to_string()))?;
                    fetch_with_retry(source.as_ref(), point, chunk, retries, backoff).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (task, chunk) in tasks.into_iter().zip(&chunks) {
            let unavailable = |reason: String| PipelineError::unavailable(&region.name, chunk.to_string(), reason);
            let observations = task
                .await
                .map_err(|e| unavailable(e.to_string()))?
                .map_err(|e| unavailable(e.to_string()))?;
            results.push(observations);
        }

        let merged = merge_chunks(results);
        let rows = localize(&region.name, tz, &merged, window)?;

        info!(samples = merged.len(), rows = rows.len(), "Weather series complete");
        Ok(rows)
    }

    /// Fetches every configured region in order. With `allow_partial`, a
    /// region whose data is unavailable is recorded as incomplete instead of
    /// failing the run.
    #[tracing::instrument(skip(self, config, window), fields(window = %window.tag))]
    pub async fn fetch_all(
        &self,
        config: &StudyConfig,
        window: &StudyWindow,
        allow_partial: bool,
    ) -> Result<WeatherTable> {
        let mut table = WeatherTable::new();

        for region in &config.regions {
            let tz = config.region_timezone(region)?;
            match self.fetch_region(region, tz, window).await {
                Ok(rows) => table.insert_region(&region.name, rows),
                Err(e @ PipelineError::DataUnavailable { .. }) if allow_partial => {
                    warn!(region = %region.name, error = %e, "Continuing with incomplete weather");
                    table.mark_incomplete(&region.name, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Ok(table)
    }
}

async fn fetch_with_retry<S: ArchiveSource + ?Sized>(
    source: &S,
    point: GeoPoint,
    span: DateSpan,
    retries: u32,
    backoff: Duration,
) -> std::result::Result<Vec<UtcObservation>, ArchiveError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match source.hourly(point, span).await {
            Ok(observations) => return Ok(observations),
            Err(e) if attempt <= retries => {
                warn!(span = %span, attempt, error = %e, "Weather request failed, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeatherConfig;
    use crate::weather::normalize::tests::{hourly_series, window};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeArchive {
        requested: Mutex<Vec<DateSpan>>,
    }

    #[async_trait]
    impl ArchiveSource for FakeArchive {
        async fn hourly(&self, _point: GeoPoint, span: DateSpan) -> std::result::Result<Vec<UtcObservation>, ArchiveError> {
            self.requested.lock().unwrap().push(span);
            let first = Utc.from_utc_datetime(&span.start.and_hms_opt(0, 0, 0).unwrap());
            let hours = ((span.end - span.start).num_days() + 1) * 24;
            Ok(hourly_series(first, hours))
        }
    }

    struct FailingArchive {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArchiveSource for FailingArchive {
        async fn hourly(&self, _point: GeoPoint, _span: DateSpan) -> std::result::Result<Vec<UtcObservation>, ArchiveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ArchiveError::Status {
                status: 503,
                body: "upstream unavailable".into(),
            })
        }
    }

    fn settings(max_days: u32) -> WeatherConfig {
        WeatherConfig {
            max_days_per_request: max_days,
            retries: 2,
            retry_backoff_ms: 0,
            concurrency: 2,
            ..Default::default()
        }
    }

    fn region(name: &str) -> RegionConfig {
        RegionConfig {
            name: name.into(),
            latitude: 34.022449,
            longitude: -118.438332,
            timezone: None,
            bounds: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_region_chunks_and_localizes() {
        let fetcher = WeatherFetcher::new(FakeArchive::default(), settings(2));
        let w = window("fall", (2024, 11, 1), (2024, 11, 5));

        let rows = fetcher
            .fetch_region(&region("Westside"), chrono_tz::America::Los_Angeles, &w)
            .await
            .unwrap();

        assert_eq!(rows.len(), 5 * 24);
        let nov3 = w.start_date.succ_opt().unwrap().succ_opt().unwrap();
        let one_am = rows.iter().find(|r| r.date == nov3 && r.hour == 1).unwrap();
        assert_eq!(one_am.source_utc.to_rfc3339(), "2024-11-03T08:00:00+00:00");

        let mut spans = fetcher.source.requested.lock().unwrap().clone();
        spans.sort_by_key(|s| s.start);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[0].start.to_string(), "2024-10-31");
        assert_eq!(spans[3].end.to_string(), "2024-11-06");
        assert!(spans.windows(2).all(|p| p[0].end.succ_opt() == Some(p[1].start)));
    }

    #[tokio::test]
    async fn test_failing_source_exhausts_retries() {
        let fetcher = WeatherFetcher::new(FailingArchive { calls: AtomicUsize::new(0) }, settings(92));
        let w = window("fail", (2024, 11, 1), (2024, 11, 5));

        let err = fetcher
            .fetch_region(&region("DTLA"), chrono_tz::America::Los_Angeles, &w)
            .await
            .unwrap_err();

        match &err {
            PipelineError::DataUnavailable { region, span, reason } => {
                assert_eq!(region, "DTLA");
                assert_eq!(span, "2024-10-31..2024-11-06");
                assert!(reason.contains("503"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_partial() {
        let cfg = StudyConfig::from_toml_str(crate::config::tests::SAMPLE).unwrap();
        let w = window("short", (2024, 11, 1), (2024, 11, 1));
        let fetcher = WeatherFetcher::new(FailingArchive { calls: AtomicUsize::new(0) }, settings(92));

        let err = fetcher.fetch_all(&cfg, &w, false).await.unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { .. }));

        let table = fetcher.fetch_all(&cfg, &w, true).await.unwrap();
        assert!(!table.is_complete("Westside"));
        assert!(!table.is_complete("DTLA"));
        assert_eq!(table.region_len("Westside"), 0);
    }
}
