//! Route table: ordered behaviors plus exactly one default.

use std::collections::HashMap;

use regex::Regex;
use resource_layer::LogicalId;
use serde::{Deserialize, Serialize};

use crate::domain::behavior::Behavior;
use crate::domain::error::{Result, SynthError};

/// Pattern of the catch-all behavior.
pub const DEFAULT_PATTERN: &str = "*";

/// Longest path pattern the delivery layer accepts.
pub const MAX_PATTERN_LEN: usize = 255;

/// A validated delivery-layer path pattern (`*` and `?` wildcards).
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    regex: Regex,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| SynthError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        if pattern.is_empty() {
            return Err(invalid("empty"));
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(invalid("longer than 255 characters"));
        }
        if !pattern.chars().all(|c| c.is_ascii_graphic()) {
            return Err(invalid("contains whitespace or non-ASCII characters"));
        }

        let mut source = String::from("^");
        for c in normalize(pattern).chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        let regex = Regex::new(&source).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(normalize(path))
    }

    /// True when the pattern has no wildcards.
    pub fn is_exact(&self) -> bool {
        !self.raw.contains(['*', '?'])
    }

    /// Characters before the first wildcard, used for specificity.
    pub fn literal_prefix_len(&self) -> usize {
        let normalized = normalize(&self.raw);
        normalized.find(['*', '?']).unwrap_or(normalized.len())
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn same_pattern(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Ordered behaviors plus the catch-all default.
///
/// Built once per synthesis pass; the delivery layer receives it read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteTable {
    default: Behavior,
    behaviors: Vec<Behavior>,
}

impl RouteTable {
    /// Start a table from its default behavior.
    pub fn new(mut default: Behavior) -> Self {
        default.path_pattern = DEFAULT_PATTERN.to_string();
        Self {
            default,
            behaviors: Vec::new(),
        }
    }

    /// Insert a behavior. A behavior with the same pattern (ignoring a
    /// leading `/`) is replaced in place, keeping its position; otherwise
    /// it is appended.
    pub fn insert(&mut self, behavior: Behavior) -> Result<()> {
        let pattern = PathPattern::parse(&behavior.path_pattern)?;
        if normalize(pattern.as_str()) == DEFAULT_PATTERN {
            return Err(SynthError::InvalidPathPattern {
                pattern: behavior.path_pattern,
                reason: "catch-all pattern is reserved for the default behavior".to_string(),
            });
        }

        match self
            .behaviors
            .iter_mut()
            .find(|b| same_pattern(&b.path_pattern, &behavior.path_pattern))
        {
            Some(existing) => *existing = behavior,
            None => self.behaviors.push(behavior),
        }
        Ok(())
    }

    pub fn default_behavior(&self) -> &Behavior {
        &self.default
    }

    pub(crate) fn default_behavior_mut(&mut self) -> &mut Behavior {
        &mut self.default
    }

    /// Additional (non-default) behaviors in table order.
    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    /// Behavior registered under `pattern`.
    pub fn get(&self, pattern: &str) -> Option<&Behavior> {
        if normalize(pattern) == DEFAULT_PATTERN {
            return Some(&self.default);
        }
        self.behaviors
            .iter()
            .find(|b| same_pattern(&b.path_pattern, pattern))
    }

    /// Total behaviors including the default.
    pub fn len(&self) -> usize {
        self.behaviors.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Behavior that serves `path`: exact patterns win, then the wildcard
    /// pattern with the longest literal prefix, then the default.
    pub fn resolve(&self, path: &str) -> &Behavior {
        let mut best: Option<(bool, usize, &Behavior)> = None;
        for behavior in &self.behaviors {
            let Ok(pattern) = PathPattern::parse(&behavior.path_pattern) else {
                continue;
            };
            if !pattern.matches(path) {
                continue;
            }
            let rank = (pattern.is_exact(), pattern.literal_prefix_len());
            if best.map(|(e, l, _)| rank > (e, l)).unwrap_or(true) {
                best = Some((rank.0, rank.1, behavior));
            }
        }
        best.map(|(_, _, b)| b).unwrap_or(&self.default)
    }

    /// Every edge association across the table, default first.
    pub fn edge_functions(
        &self,
    ) -> impl Iterator<Item = &crate::domain::EdgeFunctionAssociation> {
        std::iter::once(&self.default)
            .chain(self.behaviors.iter())
            .flat_map(|b| b.edge_functions.iter())
    }

    /// Fill in published versions for edge associations.
    ///
    /// Fails if an association's function has no entry in `versions`.
    pub(crate) fn resolve_versions(
        &mut self,
        versions: &HashMap<LogicalId, LogicalId>,
    ) -> Result<()> {
        let behaviors = std::iter::once(&mut self.default).chain(self.behaviors.iter_mut());
        for behavior in behaviors {
            for assoc in behavior.edge_functions.iter_mut() {
                let version = versions
                    .get(&assoc.function)
                    .ok_or_else(|| SynthError::UnresolvedVersion(assoc.function.clone()))?;
                assoc.version = Some(version.clone());
            }
        }
        Ok(())
    }
}
