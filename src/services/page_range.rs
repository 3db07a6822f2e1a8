//! 页码范围解析 - 业务能力层
//!
//! 纯函数：页码选择 → 升序去重的页码，或"全部页"。
//!
//! 规则：
//! 1. 显式的起止页有效（`1 ≤ start ≤ end ≤ total`）时优先
//! 2. 否则解析范围字符串，例如 `"1,3,5-8"`
//! 3. 两者都没有时返回 `PageSelection::All`
//!
//! 无效输入一律返回 `ScanError::InvalidRange`，不会静默回退到全部页。

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::ScanError;
use crate::models::scan_job::{PageSelection, PageSelectionRequest};

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(?:\s*-\s*(\d+))?$").expect("页码正则无效"))
}

/// 解析页码选择
pub fn resolve(
    request: &PageSelectionRequest,
    total_pages: u32,
) -> Result<PageSelection, ScanError> {
    if let (Some(start), Some(end)) = (request.start_page, request.end_page) {
        if bounds_valid(start, end, total_pages) {
            return Ok(PageSelection::Pages((start..=end).collect()));
        }
        if request.page_range.is_none() {
            return Err(ScanError::invalid_range(
                format!("{}-{}", start, end),
                format!("起止页必须满足 1 ≤ 起始 ≤ 结束 ≤ {}", total_pages),
            ));
        }
    }

    match request.page_range.as_deref().map(str::trim) {
        Some(range) if !range.is_empty() => parse_range(range, total_pages),
        _ => Ok(PageSelection::All),
    }
}

fn bounds_valid(start: u32, end: u32, total_pages: u32) -> bool {
    1 <= start && start <= end && end <= total_pages
}

/// 解析范围字符串（单页与 `lo-hi` 的并集）
pub fn parse_range(range: &str, total_pages: u32) -> Result<PageSelection, ScanError> {
    let mut pages = BTreeSet::new();

    for token in range.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let caps = token_regex()
            .captures(token)
            .ok_or_else(|| ScanError::invalid_range(range, format!("无法识别的片段 '{}'", token)))?;

        let lo = parse_page(&caps[1], range)?;
        let hi = match caps.get(2) {
            Some(m) => parse_page(m.as_str(), range)?,
            None => lo,
        };

        if lo > hi {
            return Err(ScanError::invalid_range(
                range,
                format!("'{}' 起始页大于结束页", token),
            ));
        }
        if lo < 1 {
            return Err(ScanError::invalid_range(range, "页码必须 ≥ 1"));
        }
        if hi > total_pages {
            return Err(ScanError::invalid_range(
                range,
                format!("页码 {} 超出总页数 {}", hi, total_pages),
            ));
        }

        pages.extend(lo..=hi);
    }

    if pages.is_empty() {
        return Err(ScanError::invalid_range(range, "没有选择任何页"));
    }

    Ok(PageSelection::Pages(pages.into_iter().collect()))
}

fn parse_page(digits: &str, range: &str) -> Result<u32, ScanError> {
    digits
        .parse::<u32>()
        .map_err(|_| ScanError::invalid_range(range, format!("页码 '{}' 过大", digits)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(sel: PageSelection) -> Vec<u32> {
        match sel {
            PageSelection::Pages(p) => p,
            PageSelection::All => panic!("expected explicit pages"),
        }
    }

    #[test]
    fn parses_singletons_and_ranges() {
        let sel = resolve(&PageSelectionRequest::range("1,3-4"), 5).unwrap();
        assert_eq!(pages(sel), vec![1, 3, 4]);
    }

    #[test]
    fn merges_overlaps_and_tolerates_whitespace() {
        let sel = resolve(&PageSelectionRequest::range(" 5-8 , 3,7 ,, 1 - 2"), 10).unwrap();
        assert_eq!(pages(sel), vec![1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_request_means_all_pages() {
        assert_eq!(resolve(&PageSelectionRequest::all(), 4).unwrap(), PageSelection::All);
        assert_eq!(resolve(&PageSelectionRequest::range("  "), 4).unwrap(), PageSelection::All);
    }

    #[test]
    fn valid_bounds_take_priority_over_range() {
        let request = PageSelectionRequest {
            start_page: Some(2),
            end_page: Some(3),
            page_range: Some("1".into()),
        };
        assert_eq!(pages(resolve(&request, 5).unwrap()), vec![2, 3]);
    }

    #[test]
    fn invalid_bounds_fall_through_to_range_string() {
        let request = PageSelectionRequest {
            start_page: Some(4),
            end_page: Some(2),
            page_range: Some("1".into()),
        };
        assert_eq!(pages(resolve(&request, 5).unwrap()), vec![1]);
    }

    #[test]
    fn invalid_bounds_without_range_are_rejected() {
        let err = resolve(&PageSelectionRequest::bounds(0, 3), 5).unwrap_err();
        assert!(matches!(err, ScanError::InvalidRange { .. }));
        assert!(resolve(&PageSelectionRequest::bounds(2, 9), 5).is_err());
    }

    #[test]
    fn rejects_bad_tokens() {
        for bad in ["4-2", "0", "0-3", "6", "2-6", "a", "1;2", "-3", "99999999999"] {
            let err = resolve(&PageSelectionRequest::range(bad), 5).unwrap_err();
            assert!(
                matches!(err, ScanError::InvalidRange { .. }),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn resolving_twice_is_identical() {
        let request = PageSelectionRequest::range("2,1,2-3");
        assert_eq!(resolve(&request, 3).unwrap(), resolve(&request, 3).unwrap());
    }
}
