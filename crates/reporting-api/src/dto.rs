//! Request parameters and response bodies.

use chrono::{DateTime, Utc};
use mlm_network::{Financials, LevelStats, NetworkEntry, SyncRun, MAX_SUPPORTED_LEVELS};
use serde::{Deserialize, Serialize};
use sync_scheduler::SchedulerStatus;

use crate::error::ApiError;
use crate::store::{AffiliateRow, RankingOrder};

pub const DEFAULT_PAGE_LIMIT: u64 = 20;
pub const MAX_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_RANKING_LIMIT: u64 = 10;

/// `{ success, data, timestamp }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Validated page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Check raw `page`/`limit` query values. Signed so negatives reach here.
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Result<Self, ApiError> {
        let page = match page {
            None => 1,
            Some(p) if p >= 1 => p as u64,
            Some(p) => return Err(ApiError::BadRequest(format!("page must be >= 1, got {p}"))),
        };
        let limit = match limit {
            None => DEFAULT_PAGE_LIMIT,
            Some(l) if (1..=MAX_PAGE_LIMIT as i64).contains(&l) => l as u64,
            Some(l) => {
                return Err(ApiError::BadRequest(format!(
                    "limit must be between 1 and {MAX_PAGE_LIMIT}, got {l}"
                )))
            }
        };
        let in_range = (page - 1)
            .checked_mul(limit)
            .is_some_and(|offset| offset <= i64::MAX as u64);
        if !in_range {
            return Err(ApiError::BadRequest(format!(
                "page {page} is out of range for limit {limit}"
            )));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AffiliateListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

impl AffiliateListParams {
    pub fn window(&self) -> Result<PageWindow, ApiError> {
        PageWindow::from_query(self.page, self.limit)
    }

    /// Search term, ignoring blank input.
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub level: Option<i64>,
}

impl NetworkParams {
    pub fn window(&self) -> Result<PageWindow, ApiError> {
        PageWindow::from_query(self.page, self.limit)
    }

    pub fn level(&self) -> Result<Option<u8>, ApiError> {
        match self.level {
            None => Ok(None),
            Some(l) if (1..=i64::from(MAX_SUPPORTED_LEVELS)).contains(&l) => Ok(Some(l as u8)),
            Some(l) => Err(ApiError::BadRequest(format!(
                "level must be between 1 and {MAX_SUPPORTED_LEVELS}, got {l}"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingParams {
    pub limit: Option<i64>,
    #[serde(default)]
    pub order_by: RankingOrder,
}

impl RankingParams {
    pub fn limit(&self) -> Result<u64, ApiError> {
        match self.limit {
            None => Ok(DEFAULT_RANKING_LIMIT),
            Some(l) if (1..=MAX_PAGE_LIMIT as i64).contains(&l) => Ok(l as u64),
            Some(l) => Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {l}"
            ))),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(window: PageWindow, total: u64) -> Self {
        let total_pages = total.div_ceil(window.limit);
        Self {
            page: window.page,
            limit: window.limit,
            total,
            total_pages,
            has_next: window.page < total_pages,
            has_prev: window.page > 1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AffiliateList {
    pub affiliates: Vec<AffiliateRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct LevelCount {
    pub level: u8,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AffiliateDetail {
    #[serde(flatten)]
    pub affiliate: AffiliateRow,
    pub levels: Vec<LevelCount>,
}

#[derive(Debug, Serialize)]
pub struct MlmStructure {
    pub affiliate: String,
    pub total_network_size: u64,
    pub levels: Vec<LevelStats>,
    pub totals: Financials,
    pub last_calculated: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct NetworkPage {
    pub affiliate: String,
    pub entries: Vec<NetworkEntry>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusView {
    pub runs: Vec<SyncRun>,
    /// Absent when the node runs without a scheduler.
    pub scheduler: Option<SchedulerStatus>,
}

#[derive(Debug, Serialize)]
pub struct DependencyCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthView {
    pub service: String,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub database: DependencyCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let window = PageWindow::from_query(None, None).unwrap();
        assert_eq!(window, PageWindow { page: 1, limit: 20 });
        assert_eq!(window.offset(), 0);
    }

    #[test]
    fn test_page_bounds() {
        assert!(PageWindow::from_query(Some(0), None).is_err());
        assert!(PageWindow::from_query(Some(-2), None).is_err());
        assert!(PageWindow::from_query(None, Some(0)).is_err());
        assert!(PageWindow::from_query(None, Some(101)).is_err());
        assert_eq!(
            PageWindow::from_query(Some(3), Some(100)).unwrap().offset(),
            200
        );
        assert!(PageWindow::from_query(Some(i64::MAX), Some(100)).is_err());
        assert!(PageWindow::from_query(Some(i64::MAX), Some(1)).is_ok());
    }

    #[test]
    fn test_blank_search_ignored() {
        let params = AffiliateListParams {
            search: Some("  ".to_string()),
            ..AffiliateListParams::default()
        };
        assert_eq!(params.search(), None);
    }

    #[test]
    fn test_pagination_flags() {
        let p = Pagination::new(PageWindow { page: 2, limit: 10 }, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let empty = Pagination::new(PageWindow { page: 1, limit: 10 }, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }
}
