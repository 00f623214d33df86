//! Visitor-based collectors that build read-only indices over a parsed query.
//!
//! Each collector borrows its input for the duration of one `collect` call
//! and never retains a reference afterward — running one twice on the same
//! input yields equal results.

mod column_ref;
mod cte;
mod select_value;
mod table_source;

pub use column_ref::ColumnReferenceCollector;
pub use cte::CteCollector;
pub use select_value::{ColumnResolver, SelectValueCollector};
pub use table_source::{CteTableReferenceCollector, TableSourceCollector};

use sqlparser::ast::Cte;
use std::collections::HashMap;

/// CTE name → definition, as seen by a collector descending past a `WITH` clause.
pub type CteMap<'a> = HashMap<String, &'a Cte>;
