//! Table data paths and per-path metadata
//!
//! A `TableDataPath` names the role of a row, column or cell (header, detail,
//! summary at a level, grand total, ...) together with the header names that
//! locate it. Formats and drill-downs are looked up by path, so every data
//! cell of a column shares one lookup.

use crate::cache::{CacheMap, Cached};
use crate::table::{decode_row_count, header_text, TableLens};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Role of a row, column or cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    Header,
    GroupHeader,
    Detail,
    Summary,
    GrandTotal,
    Trailer,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDataPath {
    pub kind: PathKind,
    /// Group level for group-header and summary paths
    pub level: Option<usize>,
    /// Header names locating the data, outermost first
    pub path: Vec<String>,
}

impl TableDataPath {
    pub fn new(kind: PathKind, path: Vec<String>) -> Self {
        TableDataPath {
            kind,
            level: None,
            path,
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn invalid() -> Self {
        TableDataPath::new(PathKind::Invalid, Vec::new())
    }

    pub fn is_invalid(&self) -> bool {
        self.kind == PathKind::Invalid
    }

    pub fn is_summary(&self) -> bool {
        matches!(self.kind, PathKind::Summary | PathKind::GrandTotal)
    }

    /// Last path element, the name of the data itself
    pub fn leaf(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }
}

/// Format and drill-down information attached to a data path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub format: Option<String>,
    pub drill: Option<String>,
}

/// Supplies metadata for data paths
pub trait MetaInfoSource: Send + Sync {
    fn lookup(&self, path: &TableDataPath) -> Option<MetaInfo>;
}

impl<F> MetaInfoSource for F
where
    F: Fn(&TableDataPath) -> Option<MetaInfo> + Send + Sync,
{
    fn lookup(&self, path: &TableDataPath) -> Option<MetaInfo> {
        self(path)
    }
}

/// Memoizes `MetaInfoSource` lookups per path.
///
/// A path whose lookup found nothing is cached as absent and is not looked up
/// again until `clear`.
pub struct MetaInfoCache {
    source: Option<Arc<dyn MetaInfoSource>>,
    entries: CacheMap<TableDataPath, MetaInfo>,
}

impl MetaInfoCache {
    pub fn new(source: Option<Arc<dyn MetaInfoSource>>) -> Self {
        MetaInfoCache {
            source,
            entries: CacheMap::new(),
        }
    }

    pub fn get(&self, path: &TableDataPath) -> Option<MetaInfo> {
        let source = self.source.as_ref()?;
        self.entries
            .get_or_compute(path.clone(), || source.lookup(path))
    }

    /// `None` if the path was never looked up
    pub fn cached(&self, path: &TableDataPath) -> Option<Cached<MetaInfo>> {
        self.entries.peek(path)
    }

    pub fn clear(&self) {
        log::debug!("meta info cache cleared ({} entries)", self.entries.len());
        self.entries.clear();
    }
}

impl std::fmt::Debug for MetaInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaInfoCache")
            .field("source", &self.source.is_some())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Path classification of a lens's rows, columns and cells.
pub trait TableDataDescriptor {
    fn cell_data_path(&self, row: usize, col: usize) -> TableDataPath;

    fn row_data_path(&self, row: usize) -> TableDataPath;

    fn col_data_path(&self, col: usize) -> TableDataPath;

    fn meta_info(&self, _path: &TableDataPath) -> Option<MetaInfo> {
        None
    }
}

/// Descriptor for plain tables: header, detail and trailer rows.
pub struct DefaultDescriptor {
    table: Arc<dyn TableLens>,
    meta: MetaInfoCache,
}

impl DefaultDescriptor {
    pub fn new(table: Arc<dyn TableLens>, source: Option<Arc<dyn MetaInfoSource>>) -> Self {
        DefaultDescriptor {
            table,
            meta: MetaInfoCache::new(source),
        }
    }

    fn row_kind(&self, row: usize) -> PathKind {
        let table = self.table.as_ref();
        if row < table.header_row_count() {
            return PathKind::Header;
        }
        if !table.more_rows(row) {
            return PathKind::Invalid;
        }
        let (count, complete) = decode_row_count(table.row_count());
        if complete && row + table.trailer_row_count() >= count {
            PathKind::Trailer
        } else {
            PathKind::Detail
        }
    }

    fn col_name(&self, col: usize) -> Option<String> {
        if col >= self.table.col_count() {
            return None;
        }
        Some(header_text(self.table.as_ref(), col).unwrap_or_else(|| format!("Column [{}]", col)))
    }

    pub fn clear_cache(&self) {
        self.meta.clear();
    }
}

impl TableDataDescriptor for DefaultDescriptor {
    fn cell_data_path(&self, row: usize, col: usize) -> TableDataPath {
        let kind = self.row_kind(row);
        match (kind, self.col_name(col)) {
            (PathKind::Invalid, _) | (_, None) => TableDataPath::invalid(),
            (kind, Some(name)) => TableDataPath::new(kind, vec![name]),
        }
    }

    fn row_data_path(&self, row: usize) -> TableDataPath {
        TableDataPath::new(self.row_kind(row), Vec::new())
    }

    fn col_data_path(&self, col: usize) -> TableDataPath {
        match self.col_name(col) {
            Some(name) => TableDataPath::new(PathKind::Detail, vec![name]),
            None => TableDataPath::invalid(),
        }
    }

    fn meta_info(&self, path: &TableDataPath) -> Option<MetaInfo> {
        self.meta.get(path)
    }
}
