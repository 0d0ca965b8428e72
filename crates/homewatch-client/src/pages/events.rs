use homewatch_core::types::{EventFilter, EventRecord, EventStatistics, EventStatus, Page};

use crate::backend::EventBackend;
use crate::notice::Notifier;
use crate::pages::PageError;
use crate::store::{Action, Store};

/// Recent events fetched into the store on page mount.
pub const RECENT_LIMIT: u32 = 50;

/// Paged alert listing. Read-state changes are mirrored into the shared
/// store so the unread badge stays in step.
pub struct EventsPage<B: EventBackend> {
    backend: B,
    notifier: Notifier,
    store: Store,
    filter: EventFilter,
    page: Option<Page<EventRecord>>,
    detail: Option<EventRecord>,
    statistics: Option<EventStatistics>,
}

impl<B: EventBackend> EventsPage<B> {
    pub fn new(backend: B, notifier: Notifier, store: Store) -> Self {
        Self {
            backend,
            notifier,
            store,
            filter: EventFilter::default(),
            page: None,
            detail: None,
            statistics: None,
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    pub fn page(&self) -> Option<&Page<EventRecord>> {
        self.page.as_ref()
    }

    pub fn events(&self) -> &[EventRecord] {
        self.page.as_ref().map(|p| p.items.as_slice()).unwrap_or_default()
    }

    pub fn detail(&self) -> Option<&EventRecord> {
        self.detail.as_ref()
    }

    pub fn statistics(&self) -> Option<&EventStatistics> {
        self.statistics.as_ref()
    }

    fn report<T>(&self, result: Result<T, PageError>) -> Result<T, PageError> {
        if let Err(err) = &result {
            self.notifier.error(err.user_message());
        }
        result
    }

    /// Replace the filter and fetch its first page.
    pub async fn apply_filter(&mut self, mut filter: EventFilter) -> Result<(), PageError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return self.report(Err(PageError::Invalid("start date is after end date".into())));
            }
        }
        filter.page = 1;
        filter.size = filter.size.clamp(1, 100);
        self.filter = filter;
        self.refresh().await
    }

    pub async fn goto_page(&mut self, page: u32) -> Result<(), PageError> {
        self.filter.page = page.max(1);
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> Result<(), PageError> {
        let page = self.backend.list_events(&self.filter).await.map_err(PageError::from);
        let page = self.report(page)?;
        tracing::debug!(total = page.total, page = page.page, "events loaded");
        self.page = Some(page);
        Ok(())
    }

    /// Seed the store's recent list and unread count.
    pub async fn load_recent(&mut self) -> Result<usize, PageError> {
        let recent = self.backend.recent_events(RECENT_LIMIT).await.map_err(PageError::from);
        let recent = self.report(recent)?;
        let n = recent.items.len();
        self.store.dispatch(Action::RecentLoaded(recent.items));
        Ok(n)
    }

    pub async fn load_detail(&mut self, id: i64) -> Result<(), PageError> {
        let event = self.backend.event(id).await.map_err(PageError::from);
        self.detail = Some(self.report(event)?);
        Ok(())
    }

    pub async fn load_statistics(&mut self, days: u32) -> Result<(), PageError> {
        let stats = self
            .backend
            .event_statistics(days.clamp(1, 365))
            .await
            .map_err(PageError::from);
        self.statistics = Some(self.report(stats)?);
        Ok(())
    }

    pub async fn mark_read(&mut self, id: i64) -> Result<(), PageError> {
        let res = self.backend.mark_read(id).await.map_err(PageError::from);
        self.report(res)?;
        self.store.dispatch(Action::EventRead(id));
        self.refresh().await
    }

    pub async fn mark_all_read(&mut self) -> Result<(), PageError> {
        let res = self.backend.mark_all_read().await.map_err(PageError::from);
        self.report(res)?;
        self.store.dispatch(Action::AllRead);
        self.notifier.success("all events marked read");
        self.refresh().await
    }

    pub async fn set_status(&mut self, id: i64, status: EventStatus) -> Result<(), PageError> {
        let change = self.backend.set_status(id, status).await.map_err(PageError::from);
        let change = self.report(change)?;
        tracing::info!(id, status = change.status.as_str(), "event status changed");
        if let Some(d) = self.detail.as_mut().filter(|d| d.id == id) {
            d.status = change.status;
            d.is_processed = change.is_processed;
            d.processed_at = change.processed_at;
        }
        self.notifier.success(format!("event marked {}", change.status.as_str()));
        self.refresh().await
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), PageError> {
        let res = self.backend.delete_event(id).await.map_err(PageError::from);
        self.report(res)?;
        self.store.dispatch(Action::EventRemoved(id));
        if self.detail.as_ref().is_some_and(|d| d.id == id) {
            self.detail = None;
        }
        self.notifier.success("event deleted");
        self.refresh().await
    }
}
