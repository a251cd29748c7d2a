//! Field name normalization
//!
//! A field name needs normalizing when its first character is an uppercase
//! letter. The normalized form lowercases that character and leaves the
//! rest of the name untouched (`PartitionKey` becomes `partitionKey`).

use std::collections::HashMap;

use super::Document;

/// Normalize a single field name.
///
/// Returns `None` when the name is empty or does not start with an
/// uppercase letter.
pub fn normalize_name(name: &str) -> Option<String> {
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }

    let mut normalized = String::with_capacity(name.len());
    normalized.extend(first.to_lowercase());
    normalized.push_str(chars.as_str());
    Some(normalized)
}

/// Renames uppercase-leading field names to their lowercase-first form.
///
/// Each instance memoizes `original name -> normalized name` for its own
/// lifetime. The cache never changes results, it only skips re-deriving
/// names that repeat across documents.
#[derive(Debug, Default)]
pub struct KeyNormalizer {
    cache: HashMap<String, Option<String>>,
}

impl KeyNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized form of `name`, or `None` if it needs no change.
    pub fn transform(&mut self, name: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }
        let normalized = normalize_name(name);
        self.cache.insert(name.to_owned(), normalized.clone());
        normalized
    }

    /// Produce a copy of `doc` with affected field names normalized.
    ///
    /// When `only` is given, fields whose names are not listed are left
    /// alone. Returns `None` if no field needed renaming.
    pub fn normalize(&mut self, doc: &Document, only: Option<&[&str]>) -> Option<Document> {
        let mut renamed: Option<Document> = None;

        for (index, name) in doc.keys().enumerate() {
            if only.is_some_and(|names| !names.contains(&name)) {
                continue;
            }
            if let Some(normalized) = self.transform(name) {
                renamed
                    .get_or_insert_with(|| doc.clone())
                    .rename_at(index, normalized);
            }
        }

        renamed
    }

    /// Number of distinct names seen so far.
    pub fn cached_names(&self) -> usize {
        self.cache.len()
    }
}
