//! Query keys: structural identity for cached server-derived values.

use std::collections::BTreeMap;
use std::fmt;

/// Identity of a cached query result.
///
/// A key is an ordered tuple of string segments, e.g. `["products"]` for the
/// unfiltered product list, `["products", "7"]` for a product detail, or
/// `["products", "q=shelf"]` for a filtered list. Two keys are equal iff
/// their segment tuples are equal, and invalidation matches by prefix so
/// staling `["products"]` covers every filtered variant and detail key under
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  segments: Vec<String>,
}

impl QueryKey {
  /// Key for a whole resource collection, e.g. `root("products")`.
  pub fn root(resource: &str) -> Self {
    Self {
      segments: vec![resource.to_string()],
    }
  }

  /// Append a segment, e.g. `root("products").with(7)`.
  pub fn with(mut self, segment: impl ToString) -> Self {
    self.segments.push(segment.to_string());
    self
  }

  /// Key for a single entity, e.g. `detail("products", 7)`.
  pub fn detail(resource: &str, id: i64) -> Self {
    Self::root(resource).with(id)
  }

  /// Key for a (possibly filtered) list query.
  ///
  /// Filters that normalize to "nothing active" produce the same key as no
  /// filters at all, so `list(r, None)` and `list(r, Some(&empty))` never
  /// fragment the cache.
  pub fn list(resource: &str, filters: Option<&ListFilters>) -> Self {
    let base = Self::root(resource);
    match filters {
      Some(f) if !f.is_empty() => base.with(f.signature()),
      _ => base,
    }
  }

  /// Whether `prefix` is a leading subsequence of this key.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.segments.len() >= prefix.segments.len()
      && self.segments[..prefix.segments.len()] == prefix.segments[..]
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}]", self.segments.join(", "))
  }
}

/// Filters applied to a list query.
///
/// Blank values count as absent so that `{search: ""}` and `{}` normalize to
/// the same key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilters {
  pub search: Option<String>,
  /// Additional filter parameters; ordered map so signatures are stable.
  pub params: BTreeMap<String, String>,
}

impl ListFilters {
  pub fn search(term: impl Into<String>) -> Self {
    Self {
      search: Some(term.into()),
      params: BTreeMap::new(),
    }
  }

  pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(name.into(), value.into());
    self
  }

  /// True when no filter has an effective value.
  pub fn is_empty(&self) -> bool {
    self.effective_search().is_none() && self.effective_params().next().is_none()
  }

  fn effective_search(&self) -> Option<&str> {
    self
      .search
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
  }

  fn effective_params(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .params
      .iter()
      .map(|(k, v)| (k.as_str(), v.trim()))
      .filter(|(_, v)| !v.is_empty())
  }

  /// Deterministic key segment for these filters.
  pub fn signature(&self) -> String {
    let mut parts = Vec::new();
    if let Some(s) = self.effective_search() {
      parts.push(format!("q={}", s.to_lowercase()));
    }
    for (k, v) in self.effective_params() {
      parts.push(format!("{}={}", k, v));
    }
    parts.join("&")
  }

  /// Query-string pairs for the HTTP request carrying these filters.
  pub fn to_query_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(s) = self.effective_search() {
      pairs.push(("search".to_string(), s.to_string()));
    }
    for (k, v) in self.effective_params() {
      pairs.push((k.to_string(), v.to_string()));
    }
    pairs
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_filters_normalize_to_base_key() {
    let none = QueryKey::list("products", None);
    let empty = QueryKey::list("products", Some(&ListFilters::default()));
    let blank = QueryKey::list("products", Some(&ListFilters::search("   ")));
    assert_eq!(none, empty);
    assert_eq!(none, blank);
  }

  #[test]
  fn test_filtered_key_differs_from_base() {
    let base = QueryKey::list("products", None);
    let filtered = QueryKey::list("products", Some(&ListFilters::search("shelf")));
    assert_ne!(base, filtered);
    assert!(filtered.starts_with(&base));
  }

  #[test]
  fn test_signature_is_case_and_order_stable() {
    let a = ListFilters::search("Shelf")
      .with_param("type", "mixed")
      .with_param("active", "true");
    let b = ListFilters::search("shelf")
      .with_param("active", "true")
      .with_param("type", "mixed");
    assert_eq!(a.signature(), b.signature());
  }

  #[test]
  fn test_prefix_matching() {
    let root = QueryKey::root("products");
    let detail = QueryKey::detail("products", 7);
    let nested = QueryKey::detail("products", 7).with("containers");
    assert!(detail.starts_with(&root));
    assert!(nested.starts_with(&detail));
    assert!(!root.starts_with(&detail));
    assert!(!QueryKey::root("contacts").starts_with(&root));
  }
}
