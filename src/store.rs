use std::collections::VecDeque;

use crate::model::UpdateItem;

/// A stored, searchable representation of one discovered update.
#[derive(Debug, Clone)]
pub struct ResultRecord {
  pub item: UpdateItem,
  /// Watch link shown and opened for this record.
  pub link: Option<String>,
  title: String,
  author: String,
  visible: bool,
}

impl ResultRecord {
  pub fn new(item: UpdateItem) -> Self {
    let title = item.video.title.to_lowercase();
    let author = item.bookmark.name.to_lowercase();
    let link = item.watch_url();
    Self { item, link, title, author, visible: true }
  }

  /// `needle` must already be lower-cased. Either field matching is enough.
  fn matches(&self, needle: &str) -> bool {
    self.title.contains(needle) || self.author.contains(needle)
  }
}

/// Ordered (most recent first) collection of result records with a
/// case-insensitive title/author filter.
///
/// Filtering only toggles visibility; records are never dropped until `reset`.
#[derive(Debug, Default)]
pub struct ResultStore {
  records: VecDeque<ResultRecord>,
  term: String,
  visible: usize,
}

impl ResultStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert at the head. The active filter term applies to the new record.
  pub fn prepend(&mut self, item: UpdateItem) {
    let mut record = ResultRecord::new(item);
    record.visible = record.matches(&self.term);
    if record.visible {
      self.visible += 1;
    }
    self.records.push_front(record);
  }

  /// Remove every record. The filter term is kept.
  pub fn reset(&mut self) {
    self.records.clear();
    self.visible = 0;
  }

  pub fn filter(&mut self, term: &str) {
    self.term = term.to_lowercase();
    let mut visible = 0;
    for record in &mut self.records {
      record.visible = record.matches(&self.term);
      if record.visible {
        visible += 1;
      }
    }
    self.visible = visible;
  }

  /// The count badge: records currently passing the filter.
  pub fn visible_count(&self) -> usize {
    self.visible
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  /// True when the empty-state placeholder should be shown.
  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  #[cfg(test)]
  pub fn term(&self) -> &str {
    &self.term
  }

  #[cfg(test)]
  pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
    self.records.iter()
  }

  pub fn visible(&self) -> impl Iterator<Item = &ResultRecord> {
    self.records.iter().filter(|r| r.visible)
  }

  /// The `n`th visible record, counting from the head.
  pub fn visible_nth(&self, n: usize) -> Option<&ResultRecord> {
    self.visible().nth(n)
  }
}
