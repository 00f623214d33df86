use crate::error::TransformError;
use sqlparser::ast::{Expr, LimitClause, Offset, OffsetRows, Query, Value};

#[derive(Debug, Clone, Copy)]
pub struct PaginationSpec {
    pub page: u64,
    pub page_size: u64,
}

/// Emits `LIMIT :page_size OFFSET :((page-1)*page_size)`, omitting OFFSET
/// when it is zero. Rejects a query that already carries LIMIT or OFFSET.
pub fn inject_pagination(query: &mut Query, spec: PaginationSpec) -> Result<(), TransformError> {
    if query.limit_clause.is_some() {
        return Err(TransformError::PaginationConflict);
    }
    let offset_value = spec.page.saturating_sub(1) * spec.page_size;
    let limit = Expr::value(Value::Number(spec.page_size.to_string(), false));
    let offset = if offset_value == 0 {
        None
    } else {
        Some(Offset {
            value: Expr::value(Value::Number(offset_value.to_string(), false)),
            rows: OffsetRows::None,
        })
    };
    query.limit_clause = Some(LimitClause::LimitOffset {
        limit: Some(limit),
        offset,
        limit_by: Vec::new(),
    });
    Ok(())
}
