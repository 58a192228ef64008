//! Source/key selection: exact sets, per-source key maps, and glob pairs.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;

use crate::error::{Error, Result};

use super::DataCollection;

/// What to keep when deriving a filtered collection.
///
/// The three shapes normalize to one set of (source, key) pairs; a key of
/// `*` stands for "all keys of that source".
#[derive(Debug, Clone)]
pub enum Selector {
    /// Exact (source, key) pairs, passed through unvalidated
    Pairs(HashSet<(String, String)>),
    /// Per-source key sets; an empty set keeps all keys of that source.
    /// Every named source must exist in the collection.
    Keys(HashMap<String, HashSet<String>>),
    /// (source-glob, key-glob) pairs expanded against the known sources and
    /// keys; a pair matching nothing is an error.
    Globs(Vec<(String, String)>),
}

impl Selector {
    /// One glob pair
    pub fn glob(source_glob: impl Into<String>, key_glob: impl Into<String>) -> Self {
        Selector::Globs(vec![(source_glob.into(), key_glob.into())])
    }

    /// Several glob pairs
    pub fn globs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Selector::Globs(
            pairs
                .into_iter()
                .map(|(src, key)| (src.into(), key.into()))
                .collect(),
        )
    }

    /// Exact (source, key) pairs
    pub fn pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Selector::Pairs(
            pairs
                .into_iter()
                .map(|(src, key)| (src.into(), key.into()))
                .collect(),
        )
    }

    /// Whole sources, all keys
    pub fn sources<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Keys(
            names
                .into_iter()
                .map(|name| (name.into(), HashSet::new()))
                .collect(),
        )
    }
}

// fnmatch-style translation: * and ? are wildcards, [seq] / [!seq] are
// character classes, everything else is literal.
fn glob_body(pattern: &str) -> String {
    let mut body = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => body.push_str(".*"),
            '?' => body.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    class.push(inner);
                }
                if closed && !class.is_empty() {
                    body.push('[');
                    if let Some(rest) = class.strip_prefix('!') {
                        body.push('^');
                        body.push_str(rest);
                    } else {
                        body.push_str(&class);
                    }
                    body.push(']');
                } else {
                    // Unterminated or empty class: treat the bracket literally.
                    body.push_str(&regex::escape("["));
                    body.push_str(&regex::escape(&class));
                    if closed {
                        body.push_str(&regex::escape("]"));
                    }
                }
            }
            other => body.push_str(&regex::escape(&other.to_string())),
        }
    }
    body
}

fn glob_regex(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^{}$", glob_body(pattern)))
        .map_err(|e| Error::InvalidData(format!("bad glob pattern {:?}: {}", pattern, e)))
}

// Control-source keys match with or without a trailing ".value", unless the
// pattern already pins that suffix down.
fn control_key_regex(key_glob: &str) -> Result<Regex> {
    Regex::new(&format!("^{}(\\.value)?$", glob_body(key_glob)))
        .map_err(|e| Error::InvalidData(format!("bad glob pattern {:?}: {}", key_glob, e)))
}

impl DataCollection {
    /// Derive a collection keeping only the selected sources and keys.
    ///
    /// The receiver is untouched; the result has its own registry, caches,
    /// and recomputed train-ID list.
    pub fn select(&self, selector: &Selector) -> Result<DataCollection> {
        let selection = self.expand_selection(selector)?;
        let selected: BTreeSet<String> = selection.iter().map(|(source, _)| source.clone()).collect();

        let mut res = DataCollection::new();
        res.control_sources = self.control_sources.intersection(&selected).cloned().collect();
        res.instrument_sources = self
            .instrument_sources
            .intersection(&selected)
            .cloned()
            .collect();
        res.segments = self
            .segments
            .iter()
            .filter(|(source, _)| selected.contains(*source))
            .map(|(source, segments)| (source.clone(), segments.clone()))
            .collect();
        res.index_cache = RefCell::new(
            self.index_cache
                .borrow()
                .filtered(|source| selected.contains(source)),
        );
        res.recompute_train_ids();

        let mut selected_keys: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (source, key) in selection {
            selected_keys.entry(source).or_default().insert(key);
        }
        let parent_keys = self.source_keys.borrow();
        let mut restriction = res.source_keys.borrow_mut();
        for (source, keys) in selected_keys {
            if keys.contains("*") {
                // Wildcard inherits an existing restriction; otherwise the
                // keys stay open for later file discovery.
                if let Some(existing) = parent_keys.get(&source) {
                    restriction.insert(source, existing.clone());
                }
            } else {
                restriction.insert(source, keys);
            }
        }
        drop(restriction);
        drop(parent_keys);

        log::debug!(
            "selected {} of {} sources",
            res.segments.len(),
            self.segments.len()
        );
        Ok(res)
    }

    /// Shorthand for [`DataCollection::select`] with a single glob pair
    pub fn select_glob(&self, source_glob: &str, key_glob: &str) -> Result<DataCollection> {
        self.select(&Selector::glob(source_glob, key_glob))
    }

    /// Normalize any selector shape to a set of (source, key) pairs
    fn expand_selection(&self, selector: &Selector) -> Result<HashSet<(String, String)>> {
        match selector {
            Selector::Pairs(pairs) => Ok(pairs.clone()),
            Selector::Keys(by_source) => {
                let known = self.all_sources();
                let mut res = HashSet::new();
                for (source, keys) in by_source {
                    if !known.contains(source) {
                        return Err(Error::SourceNotFound(source.clone()));
                    }
                    if keys.is_empty() {
                        res.insert((source.clone(), "*".to_string()));
                    } else {
                        for key in keys {
                            res.insert((source.clone(), key.clone()));
                        }
                    }
                }
                Ok(res)
            }
            Selector::Globs(pairs) => {
                let mut res = HashSet::new();
                for (source_glob, key_glob) in pairs {
                    res.extend(self.expand_glob_pair(source_glob, key_glob)?);
                }
                Ok(res)
            }
        }
    }

    fn expand_glob_pair(
        &self,
        source_glob: &str,
        key_glob: &str,
    ) -> Result<HashSet<(String, String)>> {
        let source_re = glob_regex(source_glob)?;
        let key_re = glob_regex(key_glob)?;
        let ctrl_key_re = if key_glob.ends_with(".value") || key_glob.ends_with('*') {
            None
        } else {
            Some(control_key_regex(key_glob)?)
        };

        let mut matched = HashSet::new();
        for source in self.all_sources() {
            if !source_re.is_match(&source) {
                continue;
            }
            if key_glob == "*" {
                matched.insert((source, "*".to_string()));
                continue;
            }
            let re = match (&ctrl_key_re, self.control_sources.contains(&source)) {
                (Some(ctrl), true) => ctrl,
                _ => &key_re,
            };
            for key in self.keys_for_source(&source)? {
                if re.is_match(&key) {
                    matched.insert((source.clone(), key));
                }
            }
        }

        if matched.is_empty() {
            return Err(Error::NoPatternMatch {
                source_glob: source_glob.to_string(),
                key_glob: key_glob.to_string(),
            });
        }
        Ok(matched)
    }
}
