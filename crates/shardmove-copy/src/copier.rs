//! Paginated batch copier
//!
//! The single copy primitive behind every domain migrator and behind
//! pipeline discovery:
//! 1. fetch a page at the current cursor
//! 2. hand a non-empty page to the sink as one batch
//! 3. advance the cursor (by page size, or past the last key)
//! 4. stop on the first page shorter than the page size
//!
//! Batches are atomic individually; nothing spans domains.

use crate::domain::{DataDomain, Paging};
use crate::error::CopyError;
use crate::record::{CursorKey, Owner};
use crate::store::{SourceStore, TargetStore};
use std::future::Future;

/// Position of the next page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Skip this many rows
    Offset(u64),
    /// Rows whose key is at least this value
    FromKey(u64),
}

/// One page read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Where the page starts
    pub cursor: Cursor,
    /// Maximum rows, `None` for an unbounded read
    pub limit: Option<usize>,
}

impl PageRequest {
    /// Apply this request to rows already sorted by key
    ///
    /// Shared by in-memory stores so they page exactly like SQL would.
    pub fn slice<'a, R: CursorKey>(&self, sorted: &'a [R]) -> impl Iterator<Item = &'a R> + 'a {
        let limit = self.limit.unwrap_or(usize::MAX);
        let (skip, min_key) = match self.cursor {
            Cursor::Offset(offset) => (usize::try_from(offset).unwrap_or(usize::MAX), 0),
            Cursor::FromKey(key) => (0, key),
        };
        sorted
            .iter()
            .filter(move |row| row.cursor_key() >= min_key)
            .skip(skip)
            .take(limit)
    }
}

/// Counters for one copy run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Pages requested from the source
    pub fetches: usize,
    /// Non-empty batches handed to the sink
    pub batches: usize,
    /// Rows handed to the sink
    pub rows: usize,
}

impl CopyStats {
    /// Accumulate another run
    #[inline]
    pub fn merge(&mut self, other: CopyStats) {
        self.fetches += other.fetches;
        self.batches += other.batches;
        self.rows += other.rows;
    }
}

/// Generic paginated copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCopier {
    paging: Paging,
}

impl BatchCopier {
    /// Create a copier; zero page sizes are raised to one so the loop always terminates
    #[inline]
    #[must_use]
    pub fn new(paging: Paging) -> Self {
        let paging = match paging {
            Paging::Offset { page_size } => Paging::Offset {
                page_size: page_size.max(1),
            },
            Paging::Keyset { page_size } => Paging::Keyset {
                page_size: page_size.max(1),
            },
            Paging::Unpaged => Paging::Unpaged,
        };
        Self { paging }
    }

    /// Offset-paged copier
    #[inline]
    #[must_use]
    pub fn offset(page_size: usize) -> Self {
        Self::new(Paging::Offset { page_size })
    }

    /// Keyset-paged copier
    #[inline]
    #[must_use]
    pub fn keyset(page_size: usize) -> Self {
        Self::new(Paging::Keyset { page_size })
    }

    /// Paging mode in effect
    #[inline]
    #[must_use]
    pub fn paging(&self) -> Paging {
        self.paging
    }

    /// Run the copy loop
    ///
    /// `fetch` reads one page; `write` receives each non-empty page whole.
    ///
    /// # Errors
    /// The first error from either closure; pages already written stay written.
    pub async fn run<R, F, FFut, W, WFut>(
        &self,
        mut fetch: F,
        mut write: W,
    ) -> Result<CopyStats, CopyError>
    where
        R: CursorKey,
        F: FnMut(PageRequest) -> FFut,
        FFut: Future<Output = Result<Vec<R>, CopyError>>,
        W: FnMut(Vec<R>) -> WFut,
        WFut: Future<Output = Result<(), CopyError>>,
    {
        let mut stats = CopyStats::default();
        let mut cursor = match self.paging {
            Paging::Keyset { .. } => Cursor::FromKey(0),
            Paging::Offset { .. } | Paging::Unpaged => Cursor::Offset(0),
        };

        loop {
            let request = PageRequest {
                cursor,
                limit: self.paging.page_size(),
            };
            let page = fetch(request).await?;
            stats.fetches += 1;

            let fetched = page.len();
            let next_key = page.last().map(|row| row.cursor_key().saturating_add(1));

            if fetched > 0 {
                stats.rows += fetched;
                stats.batches += 1;
                write(page).await?;
            }

            cursor = match (self.paging, cursor) {
                (Paging::Unpaged, _) => break,
                (Paging::Offset { page_size }, Cursor::Offset(offset)) => {
                    if fetched < page_size {
                        break;
                    }
                    Cursor::Offset(offset + page_size as u64)
                }
                (Paging::Keyset { page_size }, _) => match next_key {
                    Some(key) if fetched >= page_size => Cursor::FromKey(key),
                    _ => break,
                },
                (Paging::Offset { .. }, Cursor::FromKey(_)) => break,
            };
        }

        Ok(stats)
    }
}

/// Copy every row of `domain` owned by `owner` from `source` to `target`
///
/// # Errors
/// Fetch or write failure from either store.
pub async fn copy_domain(
    source: &dyn SourceStore,
    target: &dyn TargetStore,
    domain: &DataDomain,
    owner: &Owner,
) -> Result<CopyStats, CopyError> {
    let id = domain.id;
    let stats = domain
        .copier()
        .run(
            move |request| async move {
                source
                    .fetch_rows(id, owner, request)
                    .await
                    .map_err(CopyError::fetch)
            },
            move |rows| async move { target.write_rows(id, rows).await.map_err(CopyError::write) },
        )
        .await?;

    metrics::counter!("shardmove_rows_copied_total", "domain" => id.as_str())
        .increment(stats.rows as u64);
    tracing::debug!(
        domain = %id,
        owner = %owner,
        rows = stats.rows,
        fetches = stats.fetches,
        "domain copied"
    );

    Ok(stats)
}
