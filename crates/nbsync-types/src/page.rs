//! Paginated collections as returned by the backend's list endpoints.
//!
//! Items are held as `Arc<T>` so a reconciled copy shares every item it
//! didn't touch with the snapshot it was derived from.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One page of a list endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
    /// Total result count as reported by the backend.
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<Arc<T>>,
}

impl<T> Page<T> {
    /// A single page holding `results`, with `count` matching.
    pub fn from_results(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            next: None,
            previous: None,
            results: results.into_iter().map(Arc::new).collect(),
        }
    }

    /// Iterate items by reference.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.results.iter().map(|r| r.as_ref())
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

/// All pages fetched so far for one list, oldest page first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Paginated<T> {
    pub pages: Vec<Page<T>>,
}

impl<T> Paginated<T> {
    pub fn new(pages: Vec<Page<T>>) -> Self {
        Self { pages }
    }

    /// Total items held across all pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.results.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every item across pages in page order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.iter())
    }
}

impl<T> Default for Paginated<T> {
    fn default() -> Self {
        Self { pages: Vec::new() }
    }
}
