//! Conditional highlighting
//!
//! A `HighlightGroup` holds named highlights per level. Looking up a cell
//! evaluates the default level and then the requested level, in order, and
//! merges the attributes of every highlight that matches: a later highlight's
//! attribute wins when it is set, otherwise the earlier value stays.

use crate::condition::ConditionList;
use crate::condition_group::{ConditionGroup, TableRef};
use crate::error::Result;
use crate::script::{ScriptContext, ScriptEnv};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Level whose highlights apply to every lookup
pub const DEFAULT_LEVEL: &str = "(default)";

/// Formatting applied to a highlighted cell; unset fields leave the cell as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightAttrs {
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub font: Option<String>,
    pub format: Option<String>,
}

impl HighlightAttrs {
    pub fn foreground(mut self, color: impl Into<String>) -> Self {
        self.foreground = Some(color.into());
        self
    }

    pub fn background(mut self, color: impl Into<String>) -> Self {
        self.background = Some(color.into());
        self
    }

    pub fn font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Layer `over` on top of these attributes
    pub fn merge(&mut self, over: &HighlightAttrs) {
        fn take(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        take(&mut self.foreground, &over.foreground);
        take(&mut self.background, &over.background);
        take(&mut self.font, &over.font);
        take(&mut self.format, &over.format);
    }

    pub fn is_empty(&self) -> bool {
        self.foreground.is_none()
            && self.background.is_none()
            && self.font.is_none()
            && self.format.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub name: String,
    /// An empty list matches every cell
    #[serde(default)]
    pub conditions: ConditionList,
    #[serde(default)]
    pub attrs: HighlightAttrs,
}

impl Highlight {
    pub fn new(name: impl Into<String>, conditions: ConditionList, attrs: HighlightAttrs) -> Self {
        Highlight {
            name: name.into(),
            conditions,
            attrs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightLevel {
    pub level: String,
    pub highlights: Vec<Highlight>,
}

type GroupKey = (String, String);

#[derive(Serialize, Deserialize)]
#[serde(from = "Vec<HighlightLevel>", into = "Vec<HighlightLevel>")]
pub struct HighlightGroup {
    levels: Vec<HighlightLevel>,
    env: Option<Arc<dyn ScriptEnv>>,
    context: ScriptContext,
    groups: Mutex<FxHashMap<GroupKey, Arc<ConditionGroup>>>,
}

impl HighlightGroup {
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn with_script_env(mut self, env: Arc<dyn ScriptEnv>) -> Self {
        self.env = Some(env);
        self.clear_cache();
        self
    }

    pub fn with_context(mut self, context: ScriptContext) -> Self {
        self.context = context;
        self.clear_cache();
        self
    }

    fn lock_groups(&self) -> MutexGuard<'_, FxHashMap<GroupKey, Arc<ConditionGroup>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a highlight at `level`, replacing one with the same name
    pub fn add_highlight(&mut self, level: &str, highlight: Highlight) {
        self.lock_groups()
            .remove(&(level.to_string(), highlight.name.clone()));

        let entry = match self.levels.iter().position(|l| l.level == level) {
            Some(i) => &mut self.levels[i],
            None => {
                self.levels.push(HighlightLevel {
                    level: level.to_string(),
                    highlights: Vec::new(),
                });
                let last = self.levels.len() - 1;
                &mut self.levels[last]
            }
        };
        match entry.highlights.iter().position(|h| h.name == highlight.name) {
            Some(i) => entry.highlights[i] = highlight,
            None => entry.highlights.push(highlight),
        }
    }

    pub fn remove_highlight(&mut self, level: &str, name: &str) -> Option<Highlight> {
        self.lock_groups().remove(&(level.to_string(), name.to_string()));
        let entry = self.levels.iter_mut().find(|l| l.level == level)?;
        let i = entry.highlights.iter().position(|h| h.name == name)?;
        Some(entry.highlights.remove(i))
    }

    pub fn highlight(&self, level: &str, name: &str) -> Option<&Highlight> {
        self.highlights(level).iter().find(|h| h.name == name)
    }

    pub fn highlights(&self, level: &str) -> &[Highlight] {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.highlights.as_slice())
            .unwrap_or(&[])
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.level.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|l| l.highlights.is_empty())
    }

    /// Merged attributes of every highlight matching the cell, `None` when
    /// nothing matches
    pub fn find_group(
        &self,
        level: &str,
        table: &TableRef,
        row: usize,
        col: usize,
    ) -> Result<Option<HighlightAttrs>> {
        let mut merged = HighlightAttrs::default();
        let mut matched = false;
        for highlight in self.matching(level, table, row, col)? {
            merged.merge(&highlight.attrs);
            matched = true;
        }
        Ok(matched.then_some(merged))
    }

    /// Names of the highlights matching the cell, in evaluation order
    pub fn matching_names(
        &self,
        level: &str,
        table: &TableRef,
        row: usize,
        col: usize,
    ) -> Result<Vec<String>> {
        Ok(self
            .matching(level, table, row, col)?
            .into_iter()
            .map(|h| h.name.clone())
            .collect())
    }

    fn matching(
        &self,
        level: &str,
        table: &TableRef,
        row: usize,
        col: usize,
    ) -> Result<Vec<&Highlight>> {
        let mut levels = vec![DEFAULT_LEVEL];
        if level != DEFAULT_LEVEL {
            levels.push(level);
        }

        let mut found = Vec::new();
        for lvl in levels {
            for highlight in self.highlights(lvl) {
                let hit = match table {
                    TableRef::Crosstab(ct) => ConditionGroup::for_crosstab(
                        &highlight.conditions,
                        ct,
                        row,
                        col,
                        self.env.as_deref(),
                        &self.context,
                    )?
                    .evaluate_crosstab(ct, row, col),
                    _ => self
                        .condition_group(lvl, highlight, table)?
                        .evaluate_cell(table.table().as_ref(), row, col),
                };
                if hit {
                    log::trace!("highlight {:?} matches ({}, {})", highlight.name, row, col);
                    found.push(highlight);
                }
            }
        }
        Ok(found)
    }

    /// Condition group for a highlight, built on first use
    fn condition_group(
        &self,
        level: &str,
        highlight: &Highlight,
        table: &TableRef,
    ) -> Result<Arc<ConditionGroup>> {
        let key = (level.to_string(), highlight.name.clone());
        if let Some(group) = self.lock_groups().get(&key) {
            return Ok(group.clone());
        }
        let group = Arc::new(ConditionGroup::new(
            &highlight.conditions,
            table,
            self.env.as_deref(),
            &self.context,
        )?);
        self.lock_groups().insert(key, group.clone());
        Ok(group)
    }

    pub fn cached_groups(&self) -> usize {
        self.lock_groups().len()
    }

    /// Drop the bound condition groups, e.g. after the table changed shape
    pub fn clear_cache(&self) {
        let mut groups = self.lock_groups();
        if !groups.is_empty() {
            log::debug!("highlight cache cleared ({} groups)", groups.len());
        }
        groups.clear();
    }
}

impl Default for HighlightGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<HighlightLevel>> for HighlightGroup {
    fn from(levels: Vec<HighlightLevel>) -> Self {
        HighlightGroup {
            levels,
            env: None,
            context: ScriptContext::default(),
            groups: Mutex::new(FxHashMap::default()),
        }
    }
}

impl From<HighlightGroup> for Vec<HighlightLevel> {
    fn from(group: HighlightGroup) -> Self {
        group.levels
    }
}

impl Clone for HighlightGroup {
    fn clone(&self) -> Self {
        HighlightGroup {
            levels: self.levels.clone(),
            env: self.env.clone(),
            context: self.context.clone(),
            groups: Mutex::new(FxHashMap::default()),
        }
    }
}

impl std::fmt::Debug for HighlightGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightGroup")
            .field("levels", &self.levels)
            .field("script_env", &self.env.is_some())
            .field("cached_groups", &self.cached_groups())
            .finish()
    }
}
