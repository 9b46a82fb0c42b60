use super::CancelToken;
use crate::error::{IomError, Result};

/// Page window for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

/// Call `fetch_page` with advancing offsets until a page comes back empty or
/// short, or `max_total` items have been collected.
///
/// The page operation is called at most `ceil(max_total / page_size)` times
/// and the result never holds more than `max_total` items. A failed page is
/// returned as an error; a partial list is never passed off as complete.
pub fn fetch_paginated<T, F>(
    page_size: usize,
    max_total: usize,
    cancel: Option<&CancelToken>,
    mut fetch_page: F,
) -> Result<Vec<T>>
where
    F: FnMut(PageWindow) -> Result<Vec<T>>,
{
    if page_size == 0 {
        return Err(IomError::Config("page size must be at least 1".into()));
    }

    let mut items = Vec::new();
    while items.len() < max_total {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(IomError::Cancelled);
        }

        let window = PageWindow {
            offset: items.len(),
            limit: page_size.min(max_total - items.len()),
        };
        let mut page = fetch_page(window)?;
        tracing::debug!(
            offset = window.offset,
            limit = window.limit,
            returned = page.len(),
            "fetched page"
        );

        let short = page.len() < window.limit;
        page.truncate(window.limit);
        items.append(&mut page);
        if short {
            break;
        }
    }
    Ok(items)
}
