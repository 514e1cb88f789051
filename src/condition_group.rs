//! Condition groups
//!
//! A `ConditionGroup` binds a `ConditionList` to a table: every attribute is
//! resolved to a column once, at construction, and the junctions are folded
//! into a boolean tree. Evaluation only fetches values.
//!
//! Field operands (`amount > [target]`) are resolved lazily on first use and
//! refreshed from the current row on every evaluation. The `this` operand and
//! attribute stand for the column under test in `evaluate_cell`.
//!
//! Junction tree: the lowest junction level splits first; within a level OR
//! binds looser than AND; equal operators associate to the left.

use crate::condition::{Condition, ConditionItem, ConditionList, JunctionOp, Operand};
use crate::condition_filter::RowPredicate;
use crate::crosstab::{CrossTabFilter, CrossTabFilterUtil};
use crate::error::Result;
use crate::script::{ScriptContext, ScriptEnv};
use crate::table::{header_text, TableLens};
use crate::value::CellValue;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

const THIS: &str = "this";

/// The kind of table a condition group evaluates against
#[derive(Clone)]
pub enum TableRef {
    Plain(Arc<dyn TableLens>),
    /// Grouped table; names missing from it are looked up in the tables it
    /// is built on
    Grouped(Arc<dyn TableLens>),
    Crosstab(Arc<CrossTabFilter>),
    /// Calculated table whose cells are named by identifier
    Calc(Arc<dyn TableLens>),
    /// Free-form cells addressed by identifier or position
    Freehand(Arc<dyn TableLens>),
}

impl TableRef {
    /// Plain or grouped, by capability
    pub fn of(table: Arc<dyn TableLens>) -> Self {
        if table.as_grouped().is_some() {
            TableRef::Grouped(table)
        } else {
            TableRef::Plain(table)
        }
    }

    pub fn table(&self) -> Arc<dyn TableLens> {
        match self {
            TableRef::Plain(t) | TableRef::Grouped(t) | TableRef::Calc(t) | TableRef::Freehand(t) => {
                t.clone()
            }
            TableRef::Crosstab(ct) => ct.clone(),
        }
    }

    pub fn as_crosstab(&self) -> Option<&Arc<CrossTabFilter>> {
        match self {
            TableRef::Crosstab(ct) => Some(ct),
            _ => None,
        }
    }
}

impl std::fmt::Debug for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            TableRef::Plain(_) => "Plain",
            TableRef::Grouped(_) => "Grouped",
            TableRef::Crosstab(_) => "Crosstab",
            TableRef::Calc(_) => "Calc",
            TableRef::Freehand(_) => "Freehand",
        };
        f.debug_tuple("TableRef").field(&kind).finish()
    }
}

/// Where a condition reads its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef {
    Column(usize),
    /// A column of the table `depth` filters below, reached by mapping the row
    Base { depth: usize, col: usize },
    /// The column under test
    This,
}

/// Resolves column names against header text and identifiers.
///
/// Order: exact header, case-insensitive caption, identifier, fuzzy match on
/// compound (`table.column`) and aggregate (`Sum(column)`) names, then a
/// value index (`"3"` or `"Column [3]"`).
#[derive(Debug, Clone, Default)]
pub struct ColumnResolver {
    headers: Vec<String>,
    identifiers: Vec<Option<String>>,
    identifiers_first: bool,
}

impl ColumnResolver {
    pub fn from_table(table: &dyn TableLens) -> Self {
        let cols = table.col_count();
        ColumnResolver {
            headers: (0..cols)
                .map(|c| header_text(table, c).unwrap_or_default())
                .collect(),
            identifiers: (0..cols).map(|c| table.column_identifier(c)).collect(),
            identifiers_first: false,
        }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        let identifiers = vec![None; names.len()];
        ColumnResolver {
            headers: names,
            identifiers,
            identifiers_first: false,
        }
    }

    /// Try identifiers before header text
    pub fn identifiers_first(mut self) -> Self {
        self.identifiers_first = true;
        self
    }

    /// Drop header text, leaving identifiers and positions
    pub fn without_headers(mut self) -> Self {
        self.headers = vec![String::new(); self.headers.len()];
        self
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<usize> {
        if self.identifiers_first {
            if let Some(col) = self.by_identifier(name) {
                return Some(col);
            }
        }
        self.by_header(name)
            .or_else(|| self.by_caption(name))
            .or_else(|| self.by_identifier(name))
            .or_else(|| self.by_fuzzy(name))
            .or_else(|| self.by_value_index(name))
    }

    fn by_header(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| !h.is_empty() && h == name)
    }

    fn by_caption(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.headers
            .iter()
            .position(|h| !h.is_empty() && h.trim().eq_ignore_ascii_case(name))
    }

    fn by_identifier(&self, name: &str) -> Option<usize> {
        let matches = |exact: bool| {
            self.identifiers.iter().position(|id| {
                id.as_deref().is_some_and(|id| {
                    if exact {
                        id == name
                    } else {
                        id.eq_ignore_ascii_case(name)
                    }
                })
            })
        };
        matches(true).or_else(|| matches(false))
    }

    fn by_fuzzy(&self, name: &str) -> Option<usize> {
        let wanted = core_name(name);
        if wanted.is_empty() {
            return None;
        }
        self.headers
            .iter()
            .position(|h| !h.is_empty() && core_name(h).eq_ignore_ascii_case(wanted))
    }

    fn by_value_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        let digits = name
            .strip_prefix("Column [")
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(name);
        digits
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&index| index < self.headers.len())
    }
}

/// `Sum(Orders.amount)` -> `amount`
fn core_name(name: &str) -> &str {
    let name = strip_wrapper(name.trim());
    match name.rfind(['.', ':']) {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Inner text of an aggregate wrapper like `Sum(x)`
fn strip_wrapper(name: &str) -> &str {
    let Some(open) = name.find('(') else {
        return name;
    };
    let head = &name[..open];
    if !head.is_empty() && head.chars().all(char::is_alphanumeric) && name.ends_with(')') {
        name[open + 1..name.len() - 1].trim()
    } else {
        name
    }
}

/// `None(x)` marks an unaggregated measure; the name is `x`
fn strip_none(name: &str) -> &str {
    name.strip_prefix("None(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(name)
}

/// Columns read by attribute conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(SmallVec<[u64; 2]>);

impl ColumnSet {
    pub fn insert(&mut self, col: usize) {
        let word = col / 64;
        if self.0.len() <= word {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << (col % 64);
    }

    pub fn contains(&self, col: usize) -> bool {
        self.0.get(col / 64).is_some_and(|w| w & (1u64 << (col % 64)) != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &word)| {
            (0..64).filter(move |b| word & (1u64 << b) != 0).map(move |b| i * 64 + b)
        })
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// One past the highest column
    fn bound(&self) -> usize {
        self.iter().last().map_or(0, |c| c + 1)
    }
}

/// A field operand: condition slot, operand position and the column it reads
pub struct FieldRef {
    pub slot: usize,
    pub operand: usize,
    pub name: String,
    column: OnceLock<Option<ColumnRef>>,
}

impl FieldRef {
    fn new(slot: usize, operand: usize, name: String) -> Self {
        FieldRef {
            slot,
            operand,
            name,
            column: OnceLock::new(),
        }
    }

    fn this(slot: usize, operand: usize) -> Self {
        let field = FieldRef::new(slot, operand, THIS.to_string());
        let _ = field.column.set(Some(ColumnRef::This));
        field
    }

    /// Resolved column, `None` before first use
    pub fn column(&self) -> Option<Option<ColumnRef>> {
        self.column.get().copied()
    }

    fn resolve(&self, resolver: &Resolve) -> Option<ColumnRef> {
        *self.column.get_or_init(|| resolver(&self.name))
    }
}

impl std::fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRef")
            .field("slot", &self.slot)
            .field("operand", &self.operand)
            .field("name", &self.name)
            .field("column", &self.column.get())
            .finish()
    }
}

#[derive(Debug)]
struct Leaf {
    attribute: Option<ColumnRef>,
    condition: Condition,
    /// Literal and script operands; field operands are filled per evaluation
    operands: Vec<CellValue>,
}

#[derive(Debug)]
enum Node {
    Leaf(usize),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
}

type Resolve = dyn Fn(&str) -> Option<ColumnRef> + Send + Sync;

pub struct ConditionGroup {
    root: Option<Node>,
    leaves: Vec<Leaf>,
    fields: Vec<FieldRef>,
    used: ColumnSet,
    resolve: Arc<Resolve>,
    /// Crosstab key names, in column order
    keys: Vec<String>,
}

impl ConditionGroup {
    /// Bind `list` to a table, resolving columns the way its kind requires.
    pub fn new(
        list: &ConditionList,
        table: &TableRef,
        env: Option<&dyn ScriptEnv>,
        ctx: &ScriptContext,
    ) -> Result<Self> {
        match table {
            TableRef::Plain(t) => {
                let resolver = ColumnResolver::from_table(t.as_ref());
                Self::build(list, by_resolver(resolver), Vec::new(), env, ctx)
            }
            TableRef::Grouped(t) => {
                Self::build(list, with_base_fallback(t.as_ref()), Vec::new(), env, ctx)
            }
            TableRef::Calc(t) => {
                let resolver = ColumnResolver::from_table(t.as_ref()).identifiers_first();
                Self::build(list, by_resolver(resolver), Vec::new(), env, ctx)
            }
            TableRef::Freehand(t) => {
                let resolver = ColumnResolver::from_table(t.as_ref()).without_headers();
                Self::build(list, by_resolver(resolver), Vec::new(), env, ctx)
            }
            TableRef::Crosstab(ct) => {
                let keys: Vec<String> = ct
                    .row_dim_headers()
                    .into_iter()
                    .chain(ct.col_dim_headers())
                    .chain(ct.aggregate_headers())
                    .collect();
                Self::for_keys(list, keys, env, ctx)
            }
        }
    }

    /// Bind `list` through a caller-supplied name resolver
    pub fn with_resolver<F>(
        list: &ConditionList,
        resolve: F,
        env: Option<&dyn ScriptEnv>,
        ctx: &ScriptContext,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<usize> + Send + Sync + 'static,
    {
        Self::build(
            list,
            Arc::new(move |name: &str| resolve(name).map(ColumnRef::Column)),
            Vec::new(),
            env,
            ctx,
        )
    }

    /// Bind `list` to the names visible at one crosstab cell: its dimensions
    /// and its aggregate, or every aggregate on total cells.
    pub fn for_crosstab(
        list: &ConditionList,
        crosstab: &CrossTabFilter,
        row: usize,
        col: usize,
        env: Option<&dyn ScriptEnv>,
        ctx: &ScriptContext,
    ) -> Result<Self> {
        let pairs = CrossTabFilterUtil::get_key_value_pairs(crosstab, row, col).unwrap_or_default();
        let keys: Vec<String> = crosstab
            .row_dim_headers()
            .into_iter()
            .chain(crosstab.col_dim_headers())
            .chain(crosstab.aggregate_headers())
            .filter(|key| pairs.contains_key(key))
            .collect();
        Self::for_keys(list, keys, env, ctx)
    }

    fn for_keys(
        list: &ConditionList,
        keys: Vec<String>,
        env: Option<&dyn ScriptEnv>,
        ctx: &ScriptContext,
    ) -> Result<Self> {
        let names = keys.iter().map(|k| strip_none(k).to_string()).collect();
        let resolver = ColumnResolver::from_names(names);
        Self::build(list, by_resolver(resolver), keys, env, ctx)
    }

    fn build(
        list: &ConditionList,
        resolve: Arc<Resolve>,
        keys: Vec<String>,
        env: Option<&dyn ScriptEnv>,
        ctx: &ScriptContext,
    ) -> Result<Self> {
        list.validate()?;

        let mut leaves = Vec::new();
        let mut fields = Vec::new();
        let mut used = ColumnSet::default();
        let mut junctions = Vec::new();

        for item in list.items() {
            match item {
                ConditionItem::Junction { op, level } => junctions.push((*op, *level)),
                ConditionItem::Condition {
                    attribute,
                    condition,
                } => {
                    let slot = leaves.len();
                    let column = if attribute.trim().eq_ignore_ascii_case(THIS) {
                        Some(ColumnRef::This)
                    } else {
                        resolve(attribute)
                    };
                    match column {
                        Some(ColumnRef::Column(c)) => used.insert(c),
                        None => log::debug!("condition column {:?} not found", attribute),
                        _ => {}
                    }

                    let mut operands = Vec::with_capacity(condition.operands.len());
                    for (i, operand) in condition.operands.iter().enumerate() {
                        let value = match operand {
                            Operand::Value(v) => v.clone(),
                            Operand::Expression(expr) => ctx.evaluate(env, expr)?,
                            Operand::Field(name) if name.trim().eq_ignore_ascii_case(THIS) => {
                                fields.push(FieldRef::this(slot, i));
                                CellValue::Null
                            }
                            Operand::Field(name) => {
                                fields.push(FieldRef::new(slot, i, name.clone()));
                                CellValue::Null
                            }
                            Operand::This => {
                                fields.push(FieldRef::this(slot, i));
                                CellValue::Null
                            }
                        };
                        operands.push(value);
                    }

                    leaves.push(Leaf {
                        attribute: column,
                        condition: condition.clone(),
                        operands,
                    });
                }
            }
        }

        let root = (!leaves.is_empty()).then(|| build_tree(&junctions, 0, leaves.len() - 1));
        log::debug!(
            "condition group bound: {} conditions, {} field operands, {} columns read",
            leaves.len(),
            fields.len(),
            used.len()
        );
        Ok(ConditionGroup {
            root,
            leaves,
            fields,
            used,
            resolve,
            keys,
        })
    }

    pub fn condition_count(&self) -> usize {
        self.leaves.len()
    }

    /// Resolved attribute column of each condition
    pub fn attribute_columns(&self) -> Vec<Option<ColumnRef>> {
        self.leaves.iter().map(|leaf| leaf.attribute).collect()
    }

    pub fn used_columns(&self) -> &ColumnSet {
        &self.used
    }

    pub fn field_refs(&self) -> &[FieldRef] {
        &self.fields
    }

    /// Evaluate one row. `this` has no column here and never matches.
    pub fn evaluate(&self, table: &dyn TableLens, row: usize) -> bool {
        self.evaluate_row(table, row, None)
    }

    /// Evaluate one cell, binding `this` to `col`
    pub fn evaluate_cell(&self, table: &dyn TableLens, row: usize, col: usize) -> bool {
        self.evaluate_row(table, row, Some(col))
    }

    /// Evaluate against a row already read into memory, indexed by column
    pub fn evaluate_values(&self, values: &[CellValue]) -> bool {
        self.run(&|column| match column {
            ColumnRef::Column(c) => Some(values.get(c).cloned().unwrap_or_default()),
            ColumnRef::Base { .. } | ColumnRef::This => None,
        })
    }

    /// Evaluate a crosstab cell by its key-value pairs; `this` is the cell's
    /// own value
    pub fn evaluate_crosstab(&self, crosstab: &CrossTabFilter, row: usize, col: usize) -> bool {
        let Some(pairs) = CrossTabFilterUtil::get_key_value_pairs(crosstab, row, col) else {
            return false;
        };
        let values: Vec<CellValue> = self
            .keys
            .iter()
            .map(|key| pairs.get(key).cloned().unwrap_or_default())
            .collect();
        self.run(&|column| match column {
            ColumnRef::Column(c) => Some(values.get(c).cloned().unwrap_or_default()),
            ColumnRef::This => Some(crosstab.get_object(row, col)),
            ColumnRef::Base { .. } => None,
        })
    }

    fn evaluate_row(&self, table: &dyn TableLens, row: usize, this: Option<usize>) -> bool {
        let mut values = vec![CellValue::Null; self.used.bound()];
        for col in self.used.iter() {
            values[col] = fetch(table, row, col);
        }

        self.run(&|column| match column {
            ColumnRef::Column(c) if self.used.contains(c) => Some(values[c].clone()),
            ColumnRef::Column(c) => Some(fetch(table, row, c)),
            ColumnRef::Base { depth, col } => fetch_base(table, row, depth, col),
            ColumnRef::This => this.map(|c| fetch(table, row, c)),
        })
    }

    fn run(&self, fetch: &dyn Fn(ColumnRef) -> Option<CellValue>) -> bool {
        match &self.root {
            Some(root) => self.eval_node(root, fetch),
            None => true,
        }
    }

    fn eval_node(&self, node: &Node, fetch: &dyn Fn(ColumnRef) -> Option<CellValue>) -> bool {
        match node {
            Node::Leaf(slot) => self.eval_leaf(*slot, fetch),
            Node::And(a, b) => self.eval_node(a, fetch) && self.eval_node(b, fetch),
            Node::Or(a, b) => self.eval_node(a, fetch) || self.eval_node(b, fetch),
        }
    }

    fn eval_leaf(&self, slot: usize, fetch: &dyn Fn(ColumnRef) -> Option<CellValue>) -> bool {
        let leaf = &self.leaves[slot];
        let Some(value) = leaf.attribute.and_then(fetch) else {
            return false;
        };

        let mut operands = Cow::Borrowed(leaf.operands.as_slice());
        for field in self.fields.iter().filter(|f| f.slot == slot) {
            let value = field
                .resolve(self.resolve.as_ref())
                .and_then(fetch)
                .unwrap_or_default();
            operands.to_mut()[field.operand] = value;
        }
        leaf.condition.evaluate(&value, &operands)
    }
}

impl RowPredicate for ConditionGroup {
    fn accept(&self, table: &dyn TableLens, row: usize) -> bool {
        self.evaluate(table, row)
    }
}

impl std::fmt::Debug for ConditionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionGroup")
            .field("root", &self.root)
            .field("leaves", &self.leaves)
            .field("fields", &self.fields)
            .field("used", &self.used)
            .finish()
    }
}

fn by_resolver(resolver: ColumnResolver) -> Arc<Resolve> {
    Arc::new(move |name: &str| resolver.resolve(name).map(ColumnRef::Column))
}

/// Resolve in the table itself, then in each table beneath it
fn with_base_fallback(table: &dyn TableLens) -> Arc<Resolve> {
    let mut chain = vec![ColumnResolver::from_table(table)];
    let mut current = table.as_filter().map(|f| f.table().clone());
    while let Some(base) = current {
        chain.push(ColumnResolver::from_table(base.as_ref()));
        current = base.as_filter().map(|f| f.table().clone());
    }

    Arc::new(move |name: &str| {
        chain.iter().enumerate().find_map(|(depth, resolver)| {
            resolver.resolve(name).map(|col| {
                if depth == 0 {
                    ColumnRef::Column(col)
                } else {
                    ColumnRef::Base { depth, col }
                }
            })
        })
    })
}

/// Fold leaves `lo..=hi` and the junctions between them into a tree
fn build_tree(junctions: &[(JunctionOp, usize)], lo: usize, hi: usize) -> Node {
    if lo == hi {
        return Node::Leaf(lo);
    }
    // junction k sits between leaf k and leaf k + 1
    let between = &junctions[lo..hi];
    let min_level = between.iter().map(|&(_, level)| level).min().unwrap_or(0);
    let last_at = |op: JunctionOp| {
        between
            .iter()
            .rposition(|&(o, level)| level == min_level && o == op)
    };
    let (split, op) = match last_at(JunctionOp::Or) {
        Some(i) => (lo + i, JunctionOp::Or),
        None => (lo + last_at(JunctionOp::And).unwrap_or(0), JunctionOp::And),
    };

    let left = Box::new(build_tree(junctions, lo, split));
    let right = Box::new(build_tree(junctions, split + 1, hi));
    match op {
        JunctionOp::And => Node::And(left, right),
        JunctionOp::Or => Node::Or(left, right),
    }
}

/// Cell value, falling back through the filters beneath `table` while the
/// value is null
fn fetch(table: &dyn TableLens, row: usize, col: usize) -> CellValue {
    let (mut table, mut row, mut col) = (table, row, col);
    loop {
        let value = table.get_object(row, col);
        if !value.is_null() {
            return value;
        }
        let Some(filter) = table.as_filter() else {
            return value;
        };
        match (filter.base_row_index(row), filter.base_col_index(col)) {
            (Some(r), Some(c)) => {
                table = filter.table().as_ref();
                row = r;
                col = c;
            }
            _ => return value,
        }
    }
}

/// Value of a column `depth` filters down, reached by mapping the row
fn fetch_base(table: &dyn TableLens, row: usize, depth: usize, col: usize) -> Option<CellValue> {
    let (mut table, mut row) = (table, row);
    for _ in 0..depth {
        let filter = table.as_filter()?;
        row = filter.base_row_index(row)?;
        table = filter.table().as_ref();
    }
    Some(fetch(table, row, col))
}

/// Column name to value of one crosstab cell, `None(x)` names unwrapped
pub fn crosstab_values(crosstab: &CrossTabFilter, row: usize, col: usize) -> FxHashMap<String, CellValue> {
    CrossTabFilterUtil::get_key_value_pairs(crosstab, row, col)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (strip_none(&k).to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_map::GroupedColumnMapFilter;
    use crate::condition::parse_condition_list;
    use crate::condition_filter::ConditionFilter;
    use crate::crosstab::{CrossTabAggregate, CrossTabOptions};
    use crate::error::{LensError, ScriptError};
    use crate::formula::FormulaSpec;
    use crate::group_filter::{GroupFilter, GroupOptions, SummaryColumn};
    use crate::script::VariableScope;
    use crate::table::test_support::table;
    use crate::table::MemoryTable;

    fn orders() -> Arc<dyn TableLens> {
        table(vec![
            vec!["region".into(), "amount".into(), "target".into(), "note".into()],
            vec!["East".into(), 10.into(), 12.into(), "rush".into()],
            vec!["East".into(), 30.into(), 20.into(), CellValue::Null],
            vec!["West".into(), 5.into(), 5.into(), "hold".into()],
        ])
    }

    fn group(text: &str, table: &Arc<dyn TableLens>) -> ConditionGroup {
        let list = parse_condition_list(text).unwrap();
        ConditionGroup::new(&list, &TableRef::of(table.clone()), None, &ScriptContext::default())
            .unwrap()
    }

    fn values(items: &[i64]) -> Vec<CellValue> {
        items.iter().map(|&v| CellValue::Int(v)).collect()
    }

    #[test]
    fn test_junction_precedence() {
        let by_index = |text: &str| {
            let list = parse_condition_list(text).unwrap();
            ConditionGroup::with_resolver(
                &list,
                |name: &str| name.strip_prefix('c').and_then(|n| n.parse().ok()),
                None,
                &ScriptContext::default(),
            )
            .unwrap()
        };

        // OR binds looser: c0 OR (c1 AND c2)
        let flat = by_index("c0 = 1 OR c1 = 1 AND c2 = 1");
        assert!(flat.evaluate_values(&values(&[1, 0, 0])));
        assert!(!flat.evaluate_values(&values(&[0, 1, 0])));
        assert!(flat.evaluate_values(&values(&[0, 1, 1])));

        // parentheses raise the level: (c0 OR c1) AND c2
        let nested = by_index("(c0 = 1 OR c1 = 1) AND c2 = 1");
        assert!(!nested.evaluate_values(&values(&[1, 0, 0])));
        assert!(nested.evaluate_values(&values(&[0, 1, 1])));

        let empty = by_index("");
        assert!(empty.evaluate_values(&[]));
    }

    #[test]
    fn test_resolution_order() {
        let source = MemoryTable::new(vec![vec![
            "Region".into(),
            "Orders.amount".into(),
            "Sum(qty)".into(),
            "code".into(),
        ]])
        .with_identifiers(vec!["r", "a", "q", "region"])
        .into_lens();
        let resolver = ColumnResolver::from_table(source.as_ref());

        assert_eq!(resolver.resolve("Region"), Some(0));
        // exact caption beats the identifier "region" on column 3
        assert_eq!(resolver.resolve("region"), Some(0));
        assert_eq!(resolver.resolve("q"), Some(2));
        assert_eq!(resolver.resolve("amount"), Some(1));
        assert_eq!(resolver.resolve("Avg(amount)"), Some(1));
        assert_eq!(resolver.resolve("qty"), Some(2));
        assert_eq!(resolver.resolve("3"), Some(3));
        assert_eq!(resolver.resolve("Column [1]"), Some(1));
        assert_eq!(resolver.resolve("9"), None);
        assert_eq!(resolver.resolve("missing"), None);

        let calc = ColumnResolver::from_table(source.as_ref()).identifiers_first();
        assert_eq!(calc.resolve("region"), Some(3));

        let freehand = ColumnResolver::from_table(source.as_ref()).without_headers();
        assert_eq!(freehand.resolve("Region"), Some(3));
        assert_eq!(freehand.resolve("amount"), None);
        assert_eq!(freehand.resolve("2"), Some(2));
    }

    #[test]
    fn test_row_evaluation_and_used_columns() {
        let t = orders();
        let g = group("region = 'East' AND amount > 15", &t);
        assert_eq!(g.used_columns().iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(!g.evaluate(t.as_ref(), 1));
        assert!(g.evaluate(t.as_ref(), 2));
        assert!(!g.evaluate(t.as_ref(), 3));

        let unknown = group("bogus = 1 OR region = 'West'", &t);
        assert_eq!(unknown.attribute_columns()[0], None);
        assert!(unknown.evaluate(t.as_ref(), 3));
        assert!(!unknown.evaluate(t.as_ref(), 1));
    }

    #[test]
    fn test_field_operands_are_cached() {
        let t = orders();
        let g = group("amount >= target", &t);
        assert_eq!(g.field_refs()[0].column(), None);
        assert!(!g.evaluate(t.as_ref(), 1));
        assert!(g.evaluate(t.as_ref(), 2));
        assert!(g.evaluate(t.as_ref(), 3));
        assert_eq!(g.field_refs()[0].column(), Some(Some(ColumnRef::Column(2))));
        assert_eq!(g.field_refs()[0].slot, 0);
        assert_eq!(g.field_refs()[0].operand, 0);
        // field columns are read on demand, not prefetched
        assert!(!g.used_columns().contains(2));
    }

    #[test]
    fn test_this_is_the_column_under_test() {
        let t = orders();
        let g = group("this > 11", &t);
        assert!(g.evaluate_cell(t.as_ref(), 1, 2));
        assert!(!g.evaluate_cell(t.as_ref(), 1, 1));
        assert!(g.evaluate_cell(t.as_ref(), 2, 1));
        assert!(!g.evaluate(t.as_ref(), 2));

        let against = group("target < this", &t);
        assert!(against.evaluate_cell(t.as_ref(), 2, 1));
        assert!(!against.evaluate_cell(t.as_ref(), 1, 1));
    }

    #[test]
    fn test_null_falls_back_through_filters() {
        let grouped = GroupFilter::new(
            orders(),
            vec![0],
            vec![SummaryColumn::new(1, FormulaSpec::new("Sum"))],
            GroupOptions::default(),
        )
        .unwrap();
        let lens: Arc<dyn TableLens> = grouped;
        assert!(lens.get_object(2, 0).is_null());

        let g = group("region = 'East'", &lens);
        assert!(g.evaluate(lens.as_ref(), 2));
        // summary rows carry the group label themselves
        assert!(g.evaluate(lens.as_ref(), 3));
        let grand = lens.row_count() as usize - 1;
        assert!(!g.evaluate(lens.as_ref(), grand));
    }

    #[test]
    fn test_grouped_hidden_columns() {
        let grouped: Arc<dyn TableLens> =
            GroupFilter::new(orders(), vec![0], vec![], GroupOptions::default()).unwrap();
        let visible: Arc<dyn TableLens> =
            GroupedColumnMapFilter::new(grouped, vec![Some(0), Some(1)]).unwrap();
        assert_eq!(visible.col_count(), 2);

        let g = group("note = 'hold'", &visible);
        assert_eq!(g.attribute_columns()[0], Some(ColumnRef::Base { depth: 1, col: 3 }));
        // rows: header, East d, East d, East summary, West d, West summary, grand
        let matching: Vec<usize> = (1..visible.row_count() as usize)
            .filter(|&r| g.evaluate(visible.as_ref(), r))
            .collect();
        assert_eq!(matching, vec![4]);
    }

    #[test]
    fn test_expression_operands() {
        let t = orders();
        let list = parse_condition_list("amount > {limit}").unwrap();
        let env = |expr: &str, scope: &VariableScope| {
            scope
                .get(expr)
                .cloned()
                .ok_or_else(|| ScriptError::new(format!("undefined: {}", expr)))
        };
        let ctx = ScriptContext::default().with_scope(VariableScope::new().with("limit", 8));
        let g = ConditionGroup::new(&list, &TableRef::Plain(t.clone()), Some(&env), &ctx).unwrap();
        assert!(g.evaluate(t.as_ref(), 1));
        assert!(!g.evaluate(t.as_ref(), 3));

        let failing = ConditionGroup::new(
            &list,
            &TableRef::Plain(t.clone()),
            Some(&env),
            &ScriptContext::default(),
        );
        assert!(matches!(failing, Err(LensError::Script(_))));

        // tolerant: the operand is null and the comparison never matches
        let tolerant =
            ConditionGroup::new(&list, &TableRef::Plain(t.clone()), Some(&env), &ScriptContext::tolerant())
                .unwrap();
        assert!(!tolerant.evaluate(t.as_ref(), 1));
    }

    #[test]
    fn test_crosstab_cells() {
        let sales = table(vec![
            vec!["region".into(), "quarter".into(), "amount".into()],
            vec!["East".into(), "Q1".into(), 10.into()],
            vec!["East".into(), "Q2".into(), 20.into()],
            vec!["West".into(), "Q1".into(), 7.into()],
        ]);
        let ct = CrossTabFilter::new(
            sales,
            vec![0],
            vec![1],
            vec![CrossTabAggregate::new(2, FormulaSpec::new("Sum"))],
            CrossTabOptions::default(),
        )
        .unwrap();
        // header, East, West, Grand Total x region, Q1, Q2, Grand Total
        let list = parse_condition_list("region = 'East' AND amount > 12").unwrap();
        let ctx = ScriptContext::default();

        let g = ConditionGroup::for_crosstab(&list, &ct, 1, 2, None, &ctx).unwrap();
        assert!(g.evaluate_crosstab(&ct, 1, 2));
        assert!(!g.evaluate_crosstab(&ct, 1, 1));
        assert!(!g.evaluate_crosstab(&ct, 2, 1));

        // grand-total column: no quarter, every aggregate
        let total = ConditionGroup::for_crosstab(
            &parse_condition_list("quarter IS NULL AND this = 30").unwrap(),
            &ct,
            1,
            3,
            None,
            &ctx,
        )
        .unwrap();
        assert_eq!(total.attribute_columns()[0], None);
        assert!(!total.evaluate_crosstab(&ct, 1, 3));

        let whole = ConditionGroup::new(&list, &TableRef::Crosstab(ct.clone()), None, &ctx).unwrap();
        assert!(whole.evaluate_crosstab(&ct, 1, 3));
        assert!(!whole.evaluate_crosstab(&ct, 0, 1));

        let vals = crosstab_values(&ct, 2, 1);
        assert_eq!(vals.get("Sum(amount)"), Some(&CellValue::Double(7.0)));
    }

    #[test]
    fn test_drives_condition_filter() {
        let t = orders();
        let list = parse_condition_list("note IS NOT NULL").unwrap();
        let g = ConditionGroup::new(&list, &TableRef::Plain(t.clone()), None, &ScriptContext::default())
            .unwrap();
        let filter = ConditionFilter::new(t, Arc::new(g));
        assert!(!filter.more_rows(3));
        assert_eq!(filter.row_count(), 3);
        assert_eq!(filter.get_object(2, 0), CellValue::from("West"));
    }
}
