/// Schedule discovery.
///
/// Every configured source is expanded into one page per calendar week,
/// the pages are fetched with a fixed number of concurrent workers, and the
/// matching programmes are merged into one newest-first list. Progress is
/// reported as a stream of [`DiscoveryEvent`]s that always ends in exactly one
/// `Finished`.
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{Local, Months, NaiveDate};
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use crate::{
    config::ScheduleSource,
    http::PageFetcher,
    listing::schedule,
    models::{DiscoveryEvent, DiscoveryReport, ProgrammeItem, dedup_by_url, sort_newest_first},
};

pub const DEFAULT_WORKERS: usize = 4;

const EVENT_BUFFER: usize = 64;

#[derive(Clone)]
pub struct ScheduleDiscovery {
    fetcher: Arc<dyn PageFetcher>,
    sources: Arc<Vec<ScheduleSource>>,
    workers: usize,
}

impl ScheduleDiscovery {
    pub fn with_workers(fetcher: Arc<dyn PageFetcher>, sources: Arc<Vec<ScheduleSource>>, workers: usize) -> Self {
        Self {
            fetcher,
            sources,
            workers: workers.max(1),
        }
    }

    pub fn sources(&self) -> &[ScheduleSource] {
        &self.sources
    }

    /// Week pages for every source covering `months` back from `today`,
    /// source by source, oldest week first, without duplicates.
    pub fn page_urls(&self, months: u32, today: NaiveDate) -> Vec<String> {
        let since = today.checked_sub_months(Months::new(months)).unwrap_or(today);
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .flat_map(|source| schedule::week_urls(&source.url, since, today))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Start a discovery run in the background and return its event stream.
    pub fn discover(&self, filter: &str, months: u32) -> ReceiverStream<DiscoveryEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();
        let filter = filter.to_string();
        let today = Local::now().date_naive();

        tokio::spawn(async move {
            let report = this.run(&filter, months, today, &tx).await;
            let _ = tx.send(DiscoveryEvent::Finished(report)).await;
        });

        ReceiverStream::new(rx)
    }

    /// Fetch every week page and merge the results. Progress goes to `tx`;
    /// a closed receiver does not stop the run.
    pub async fn run(
        &self,
        filter: &str,
        months: u32,
        today: NaiveDate,
        tx: &mpsc::Sender<DiscoveryEvent>,
    ) -> DiscoveryReport {
        let urls = self.page_urls(months, today);
        let total = urls.len();
        info!("Discovery for {filter:?}: {total} week page(s) across {} source(s)", self.sources.len());
        let _ = tx.send(DiscoveryEvent::Started { total }).await;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let processed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for (index, url) in urls.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let processed = Arc::clone(&processed);
            let tx = tx.clone();
            let filter = filter.to_string();

            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();

                let result = schedule::fetch_week(fetcher.as_ref(), &url, &filter).await;
                if let Err(e) = &result {
                    warn!("Week page {url} failed: {e}");
                    let _ = tx
                        .send(DiscoveryEvent::PageFailed {
                            url: url.clone(),
                            message: e.to_string(),
                        })
                        .await;
                }

                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = tx.send(DiscoveryEvent::PageDone { processed: done, total }).await;

                (index, url, result)
            });
        }

        let mut pages: Vec<Option<Vec<ProgrammeItem>>> = vec![None; total];
        let mut failures: Vec<(usize, String)> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(items))) => pages[index] = Some(items),
                Ok((index, url, Err(e))) => failures.push((index, format!("Error processing {url}: {e}"))),
                Err(e) => error!("Discovery task join error: {e}"),
            }
        }

        failures.sort_by_key(|(index, _)| *index);
        let errors = failures.into_iter().map(|(_, message)| message).collect();

        let mut items = dedup_by_url(pages.into_iter().flatten().flatten().collect());
        sort_newest_first(&mut items);

        info!("Discovery for {filter:?} found {} programme(s)", items.len());
        DiscoveryReport { items, errors }
    }
}
