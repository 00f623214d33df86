//! Composable, stateless query rewrites layered on top of a parsed
//! statement: dynamic filters, sort, pagination, and parameter binding.

mod bind;
mod condition;
mod filter;
mod paginate;
mod sort;

pub use bind::bind_parameters;
pub use condition::{ConditionDescriptor, FilterOperator, OperatorRecord, OperatorTerm, Scalar};
pub use filter::{inject_filter, FilterOptions};
pub use paginate::{inject_pagination, PaginationSpec};
pub use sort::{inject_sort, SortDirection, SortSpec};
