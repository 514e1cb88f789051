//! TableLens - lazy, chainable views over tabular data
//!
//! A table is anything implementing [`TableLens`]. Filters wrap an upstream
//! table and present a remapped, filtered, sorted, grouped or cross-tabulated
//! view of it, translating indices back to the upstream on demand. Conditions
//! select rows and drive highlighting; formulas compute the summary values.
//!
//! ```
//! use std::sync::Arc;
//! use tablelens::{parse_condition_list, ConditionFilter, ConditionGroup, MemoryTable, TableLens, TableRef};
//! use tablelens::{ScriptContext, resolve_row_count};
//!
//! let orders = MemoryTable::new(vec![
//!     vec!["region".into(), "amount".into()],
//!     vec!["East".into(), 10.into()],
//!     vec!["West".into(), 50.into()],
//! ])
//! .into_lens();
//!
//! let list = parse_condition_list("amount > 20").unwrap();
//! let group = ConditionGroup::new(&list, &TableRef::of(orders.clone()), None, &ScriptContext::default()).unwrap();
//! let big = ConditionFilter::new(orders, Arc::new(group));
//! assert_eq!(resolve_row_count(&*big), 2);
//! assert_eq!(big.get_object(1, 0), tablelens::CellValue::from("West"));
//! ```

pub mod value;
pub mod error;
pub mod changeset;
pub mod cache;
pub mod rowmap;
pub mod table;
pub mod column_map;
pub mod hidden;
pub mod sorted;
pub mod condition_filter;
pub mod grouped;
pub mod group_filter;
pub mod descriptor;
pub mod crosstab;
pub mod condition;
pub mod condition_group;
pub mod highlight;
pub mod script;
pub mod formula;

pub use value::CellValue;
pub use error::{LensError, Result, ScriptError};
pub use changeset::{ChangeListener, ChangeListeners, TableChange, TableChangeEvent};
pub use cache::{CacheMap, Cached};
pub use rowmap::RowMap;
pub use table::{
    decode_row_count, encode_row_count, resolve_row_count, CancellableTable, MemoryTable,
    TableFilter, TableLens,
};
pub use column_map::{ColumnMapFilter, GroupedColumnMapFilter};
pub use hidden::HiddenRowColFilter;
pub use sorted::{Comparer, SortFilter, SortKey, SortOrder, SortedTable};
pub use condition_filter::{ConditionFilter, RowPredicate};
pub use grouped::{GroupedTable, Span, SpanCache};
pub use group_filter::{GroupFilter, GroupOptions, SummaryColumn};
pub use descriptor::{
    DefaultDescriptor, MetaInfo, MetaInfoCache, MetaInfoSource, PathKind, TableDataDescriptor,
    TableDataPath,
};
pub use crosstab::{
    CrossTabAggregate, CrossTabFilter, CrossTabFilterUtil, CrossTabOptions, MergePartCell, Pair,
    Tuple,
};
pub use condition::{
    parse_condition_list, Condition, ConditionItem, ConditionList, ConditionOp, JunctionOp,
    Operand,
};
pub use condition_group::{ColumnRef, ColumnResolver, ConditionGroup, TableRef};
pub use highlight::{Highlight, HighlightAttrs, HighlightGroup, HighlightLevel, DEFAULT_LEVEL};
pub use script::{ScriptContext, ScriptEnv, VariableScope};
pub use formula::{
    create_formula, Formula, Formula2, FormulaSpec, PercentageFormula, PercentageType,
};
