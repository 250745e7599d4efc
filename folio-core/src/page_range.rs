use std::ops::RangeInclusive;

use crate::error::{ViewerError, ViewerResult};

/// Sorted, de-duplicated 0-based page indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageRangeSet(Vec<usize>);

impl PageRangeSet {
    pub fn all(page_count: usize) -> Self {
        Self((0..page_count).collect())
    }

    /// Pages `from..=to`, both 1-based and inside the document.
    pub fn span(from: usize, to: usize, total_pages: usize) -> ViewerResult<Self> {
        let spec = format!("{from}-{to}");
        if from == 0 || to > total_pages || from > to {
            return Err(ViewerError::invalid_range(
                &spec,
                format!("span must lie inside 1..={total_pages} and run forwards"),
            ));
        }
        Ok(Self(((from - 1)..to).collect()))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, page_index: usize) -> bool {
        self.0.binary_search(&page_index).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Maximal runs of consecutive pages, e.g. `{0,1,2,4}` gives `0..=2` and `4..=4`.
    pub fn runs(&self) -> Vec<RangeInclusive<usize>> {
        let mut runs: Vec<RangeInclusive<usize>> = Vec::new();
        for &page in &self.0 {
            match runs.last_mut() {
                Some(run) if *run.end() + 1 == page => *run = *run.start()..=page,
                _ => runs.push(page..=page),
            }
        }
        runs
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }
}

/// Parses a 1-based page specification such as `"1-3, 5, 7-9"`.
///
/// Whitespace is ignored. Any malformed or out-of-range token rejects the whole
/// specification.
pub fn parse_page_range(spec: &str, total_pages: usize) -> ViewerResult<PageRangeSet> {
    let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ViewerError::invalid_range(spec, "no pages given"));
    }

    let mut pages = Vec::new();
    for token in compact.split(',') {
        let (first, last) = match token.split_once('-') {
            None => {
                let page = parse_page(spec, token, total_pages)?;
                (page, page)
            }
            Some((start, end)) => {
                if end.contains('-') {
                    return Err(ViewerError::invalid_range(
                        spec,
                        format!("{token:?} has more than one dash"),
                    ));
                }
                let start = parse_page(spec, start, total_pages)?;
                let end = parse_page(spec, end, total_pages)?;
                if start > end {
                    return Err(ViewerError::invalid_range(
                        spec,
                        format!("{token:?} runs backwards"),
                    ));
                }
                (start, end)
            }
        };
        pages.extend((first - 1)..last);
    }

    pages.sort_unstable();
    pages.dedup();
    Ok(PageRangeSet(pages))
}

fn parse_page(spec: &str, token: &str, total_pages: usize) -> ViewerResult<usize> {
    if token.is_empty() {
        return Err(ViewerError::invalid_range(spec, "empty page number"));
    }
    let page: usize = token.parse().map_err(|_| {
        ViewerError::invalid_range(spec, format!("{token:?} is not a page number"))
    })?;
    if page == 0 || page > total_pages {
        return Err(ViewerError::invalid_range(
            spec,
            format!("page {page} is outside 1..={total_pages}"),
        ));
    }
    Ok(page)
}
