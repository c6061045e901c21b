//! Page normalisation and result metadata.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Page sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Requested page, as sent by the caller. Out-of-range values are corrected
/// rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaginationRequest {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
}

/// A normalised page: `page >= 1`, `1 <= page_size <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    /// Rows to skip. Saturates instead of wrapping for absurd page numbers.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

impl PaginationRequest {
    pub fn normalize(&self, limits: &PageLimits) -> Page {
        let page = self.page.max(1);
        let page_size = if self.page_size < 1 {
            limits.default_page_size
        } else {
            self.page_size.min(limits.max_page_size)
        };
        Page { page, page_size }
    }
}

/// Pagination metadata returned with a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: Page, total_items: i64) -> Self {
        let total_pages = if total_items <= 0 || page.page_size <= 0 {
            0
        } else {
            (total_items - 1) / page.page_size + 1
        };
        Self {
            page: page.page,
            page_size: page.page_size,
            total_items: total_items.max(0),
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn next_page(&self) -> Option<i64> {
        self.has_next().then_some(self.page + 1)
    }

    pub fn previous_page(&self) -> Option<i64> {
        self.has_previous().then_some(self.page - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page(page: i64, page_size: i64) -> Page {
        PaginationRequest { page, page_size }.normalize(&PageLimits::default())
    }

    #[test]
    fn defaults_and_clamps() {
        assert_eq!(page(0, 0), Page { page: 1, page_size: DEFAULT_PAGE_SIZE });
        assert_eq!(page(-3, -1), Page { page: 1, page_size: DEFAULT_PAGE_SIZE });
        assert_eq!(page(2, 500), Page { page: 2, page_size: MAX_PAGE_SIZE });
        assert_eq!(page(3, 25), Page { page: 3, page_size: 25 });
    }

    #[test]
    fn offset_from_page() {
        assert_eq!(page(1, 10).offset(), 0);
        assert_eq!(page(3, 5).offset(), 10);
        assert_eq!(page(3, 5).limit(), 5);
    }

    #[test]
    fn huge_page_saturates_offset() {
        let last = page(i64::MAX, 10);
        assert_eq!(last.page, i64::MAX);
        assert_eq!(last.offset(), i64::MAX);
        assert!(page(i64::MAX / 10, 10).offset() > 0);

        let meta = PageMeta::new(page(1, 10), i64::MAX);
        assert_eq!(meta.total_pages, i64::MAX / 10 + 1);
    }

    #[test]
    fn custom_limits() {
        let limits = PageLimits {
            default_page_size: 20,
            max_page_size: 50,
        };
        let req = PaginationRequest { page: 1, page_size: 0 };
        assert_eq!(req.normalize(&limits).page_size, 20);
        let req = PaginationRequest { page: 1, page_size: 80 };
        assert_eq!(req.normalize(&limits).page_size, 50);
    }

    #[test]
    fn metadata() {
        let meta = PageMeta::new(page(2, 10), 25);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next());
        assert!(meta.has_previous());
        assert_eq!(meta.next_page(), Some(3));
        assert_eq!(meta.previous_page(), Some(1));

        let last = PageMeta::new(page(3, 10), 25);
        assert!(!last.has_next());
        assert_eq!(last.next_page(), None);

        let empty = PageMeta::new(page(1, 10), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next());
        assert!(!empty.has_previous());
    }

    #[test]
    fn metadata_json_shape() {
        let meta = PageMeta::new(page(1, 10), 11);
        assert_eq!(
            serde_json::to_value(meta).unwrap(),
            serde_json::json!({
                "page": 1,
                "page_size": 10,
                "total_items": 11,
                "total_pages": 2
            })
        );
    }

    proptest! {
        #[test]
        fn normalized_page_is_in_range(p in any::<i64>(), s in any::<i64>()) {
            let page = page(p, s);
            prop_assert!(page.page >= 1);
            prop_assert!(page.page_size >= 1 && page.page_size <= MAX_PAGE_SIZE);
            prop_assert!(page.offset() >= 0);
            if let Some(exact) = (page.page - 1).checked_mul(page.page_size) {
                prop_assert_eq!(page.offset(), exact);
            }
        }

        #[test]
        fn total_pages_is_ceiling(total in 0i64..1_000_000_000_000, size in 1i64..=100) {
            let meta = PageMeta::new(Page { page: 1, page_size: size }, total);
            prop_assert!(meta.total_pages * size >= total);
            prop_assert!((meta.total_pages - 1).max(0) * size < total.max(1));
        }
    }
}
