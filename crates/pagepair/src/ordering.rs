//! Input file ordering.
//!
//! A regex ordering keys each file name on its named groups `int0`/`string0`,
//! `int1`/`string1`, ... in index order: `int<i>` groups compare numerically,
//! `string<i>` groups lexicographically. Names the pattern does not match sort
//! after all matching ones. Ties keep their input order.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pattern ordering numbered files (`12.png` before `100.png`).
pub const NUMBERED_PATTERN: &str = r"^(?<int0>[0-9]+)\.\w+$";

/// How a directory listing is ordered before ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum OrderSpec {
    /// Plain file-name order.
    #[default]
    Lexicographic,
    /// Regex with `int<i>` / `string<i>` named groups.
    Regex(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Int(u64),
    Text(String),
    /// Group absent or not a number; sorts after present values.
    Missing,
}

#[derive(Debug, Clone, Copy)]
enum GroupKind {
    Int,
    Text,
}

/// Compiled form of an [`OrderSpec`].
#[derive(Debug, Clone)]
pub struct NameOrder {
    regex: Option<Regex>,
    groups: Vec<(String, GroupKind)>,
}

impl OrderSpec {
    pub fn compile(&self) -> Result<NameOrder> {
        let Self::Regex(pattern) = self else {
            return Ok(NameOrder {
                regex: None,
                groups: Vec::new(),
            });
        };
        let regex = Regex::new(pattern)?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        let mut groups = Vec::new();
        for i in 0.. {
            let int = format!("int{}", i);
            let text = format!("string{}", i);
            if names.contains(&int.as_str()) {
                groups.push((int, GroupKind::Int));
            } else if names.contains(&text.as_str()) {
                groups.push((text, GroupKind::Text));
            } else {
                break;
            }
        }
        if groups.is_empty() {
            tracing::warn!("ordering pattern {:?} has no int<i>/string<i> groups", pattern);
        }
        Ok(NameOrder {
            regex: Some(regex),
            groups,
        })
    }
}

impl NameOrder {
    /// Sort key: `None` for names the pattern does not match.
    fn key(&self, name: &str) -> Option<Vec<KeyPart>> {
        let Some(regex) = &self.regex else {
            return Some(vec![KeyPart::Text(name.to_string())]);
        };
        let caps = regex.captures(name)?;
        let parts = self
            .groups
            .iter()
            .map(|(group, kind)| match (kind, caps.name(group)) {
                (GroupKind::Int, Some(m)) => m
                    .as_str()
                    .parse()
                    .map(KeyPart::Int)
                    .unwrap_or(KeyPart::Missing),
                (GroupKind::Text, Some(m)) => KeyPart::Text(m.as_str().to_string()),
                (_, None) => KeyPart::Missing,
            })
            .collect();
        Some(parts)
    }

    /// Stable sort of `items` by the name `name_of` extracts.
    pub fn sort_by_name<T>(&self, items: &mut [T], name_of: impl Fn(&T) -> String) {
        items.sort_by_cached_key(|item| {
            let key = self.key(&name_of(item));
            (key.is_none(), key.unwrap_or_default())
        });
    }

    /// Stable sort of paths by file name.
    pub fn sort_paths(&self, paths: &mut [PathBuf]) {
        self.sort_by_name(paths, |p| file_name(p));
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
