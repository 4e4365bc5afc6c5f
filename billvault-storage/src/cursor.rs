//! Paged cursor shared by the hot-store backends.

use std::future::Future;

use billvault_core::{Record, RecordId, TierResult};
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::tier::StalePage;

/// Keys scanned per page.
pub(crate) const PAGE_SIZE: usize = 256;

/// Build a lazy stream from an async page fetcher.
///
/// `fetch` receives the last key of the previous page (`None` for the first
/// page). Pages are pulled only as the consumer drains the previous one.
/// Per-item errors on a page are yielded in place and paging continues; a
/// failed page fetch ends the stream with that error.
pub(crate) fn paged<'a, F, Fut>(fetch: F) -> BoxStream<'a, TierResult<Record>>
where
    F: Fn(Option<RecordId>) -> Fut + Send + 'a,
    Fut: Future<Output = TierResult<StalePage>> + Send + 'a,
{
    stream::unfold(Some(None), move |cursor: Option<Option<RecordId>>| {
        let pending = cursor.map(&fetch);
        async move {
            let pending = pending?;
            Some(match pending.await {
                Ok(page) => (page.items, page.resume_after.map(Some)),
                Err(e) => (vec![Err(e)], None),
            })
        }
    })
    .flat_map(stream::iter)
    .boxed()
}
