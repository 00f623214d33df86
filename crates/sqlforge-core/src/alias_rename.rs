//! Renames a table or column alias at a caller-specified cursor position,
//! limited to the alias's lexical scope, via direct byte-range substitution
//! on the original SQL text.

use crate::error::TransformError;
use crate::types::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

/// The region a rename is confined to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameScope {
    Statement,
    Subquery,
    CteBody(String),
}

/// One substitution the rename performed (or would perform, in dry-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasChange {
    pub line: u64,
    pub column: u64,
    pub old_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct RenameOptions {
    pub force_scope: Option<RenameScope>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct RenameResult {
    pub success: bool,
    pub original_sql: String,
    pub new_sql: Option<String>,
    pub changes: Vec<AliasChange>,
    pub conflicts: Vec<String>,
    pub scope: RenameScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    CteBody,
    Subquery,
    Other,
}

struct Region {
    kind: RegionKind,
    name: Option<String>,
    start: usize,
    end: usize,
}

/// Renames every occurrence of `old_name` visible from `position` (1-based
/// line/column) to `new_name`, confined to the alias's scope.
pub fn rename_alias(
    sql: &str,
    dialect: Dialect,
    position: (u64, u64),
    old_name: &str,
    new_name: &str,
    options: &RenameOptions,
) -> Result<RenameResult, TransformError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    let tokens = Tokenizer::new(sqlparser_dialect.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|_| TransformError::InvalidPosition)?;

    let line_starts = line_start_offsets(sql);
    let to_offset = |loc: Location| -> usize {
        line_starts
            .get((loc.line.max(1) - 1) as usize)
            .copied()
            .unwrap_or(0)
            + (loc.column.max(1) - 1) as usize
    };

    let pos_offset = to_offset(Location::new(position.0, position.1));

    let cursor_token = tokens
        .iter()
        .find(|t| to_offset(t.span.start) <= pos_offset && pos_offset < to_offset(t.span.end))
        .ok_or(TransformError::InvalidPosition)?;
    let Token::Word(word) = &cursor_token.token else {
        return Err(TransformError::NotAnAlias);
    };
    if !word.value.eq_ignore_ascii_case(old_name) {
        return Err(TransformError::NotAnAlias);
    }

    let regions = build_regions(&tokens, &to_offset);
    let scope = options
        .force_scope
        .clone()
        .unwrap_or_else(|| scope_at(&regions, pos_offset));
    let scope_range = scope_byte_range(&regions, &scope, sql.len());

    if new_name.is_empty() || new_name.eq_ignore_ascii_case(old_name) {
        return Err(TransformError::NotAnAlias);
    }
    if is_reserved_keyword(sqlparser_dialect.as_ref(), new_name) {
        return Err(TransformError::NameConflict(new_name.to_string()));
    }

    let mut conflicts = Vec::new();
    for t in &tokens {
        let start = to_offset(t.span.start);
        if start < scope_range.0 || start >= scope_range.1 {
            continue;
        }
        if let Token::Word(w) = &t.token {
            if w.keyword == Keyword::NoKeyword
                && w.value.eq_ignore_ascii_case(new_name)
                && !w.value.eq_ignore_ascii_case(old_name)
            {
                conflicts.push(w.value.clone());
            }
        }
    }
    conflicts.sort();
    conflicts.dedup();
    if !conflicts.is_empty() {
        return Ok(RenameResult {
            success: false,
            original_sql: sql.to_string(),
            new_sql: None,
            changes: Vec::new(),
            conflicts,
            scope,
        });
    }

    let mut matches: Vec<(usize, usize, TokenWithSpan)> = Vec::new();
    for t in &tokens {
        let start = to_offset(t.span.start);
        let end = to_offset(t.span.end);
        if start < scope_range.0 || start >= scope_range.1 {
            continue;
        }
        if let Token::Word(w) = &t.token {
            if w.value.eq_ignore_ascii_case(old_name) {
                matches.push((start, end, t.clone()));
            }
        }
    }

    let changes: Vec<AliasChange> = matches
        .iter()
        .map(|(_, _, t)| AliasChange {
            line: t.span.start.line,
            column: t.span.start.column,
            old_text: old_name.to_string(),
        })
        .collect();

    if options.dry_run || changes.is_empty() {
        return Ok(RenameResult {
            success: !changes.is_empty(),
            original_sql: sql.to_string(),
            new_sql: None,
            changes,
            conflicts: Vec::new(),
            scope,
        });
    }

    let mut rewritten = sql.to_string();
    let mut ordered = matches;
    ordered.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
    for (start, end, _) in ordered {
        rewritten.replace_range(start..end, new_name);
    }

    Ok(RenameResult {
        success: true,
        original_sql: sql.to_string(),
        new_sql: Some(rewritten),
        changes,
        conflicts: Vec::new(),
        scope,
    })
}

fn line_start_offsets(sql: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, b) in sql.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn is_reserved_keyword(dialect: &dyn sqlparser::dialect::Dialect, candidate: &str) -> bool {
    match Tokenizer::new(dialect, candidate).tokenize() {
        Ok(tokens) => tokens
            .first()
            .is_some_and(|t| matches!(t, Token::Word(w) if w.keyword != Keyword::NoKeyword)),
        Err(_) => false,
    }
}

/// Walks the token stream tracking parenthesis nesting, tagging each
/// parenthesized region as a CTE body (`name AS (`), a subquery (opens on
/// `SELECT`/`WITH`), or an opaque grouping/call.
fn build_regions(tokens: &[TokenWithSpan], to_offset: &impl Fn(Location) -> usize) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut stack: Vec<(usize, RegionKind, Option<String>)> = Vec::new();
    let mut in_with_header = false;

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i].token {
            Token::Word(w) if w.keyword == Keyword::WITH && stack.is_empty() => {
                in_with_header = true;
            }
            Token::Word(w)
                if matches!(
                    w.keyword,
                    Keyword::SELECT | Keyword::INSERT | Keyword::UPDATE | Keyword::DELETE
                ) && stack.is_empty() =>
            {
                in_with_header = false;
            }
            Token::LParen => {
                let cte_name = if in_with_header && stack.is_empty() {
                    cte_name_before(tokens, i)
                } else {
                    None
                };
                let kind = if cte_name.is_some() {
                    RegionKind::CteBody
                } else if starts_subquery(tokens, i) {
                    RegionKind::Subquery
                } else {
                    RegionKind::Other
                };
                stack.push((to_offset(tokens[i].span.start), kind, cte_name));
            }
            Token::RParen => {
                if let Some((start, kind, name)) = stack.pop() {
                    let end = to_offset(tokens[i].span.end);
                    regions.push(Region {
                        kind,
                        name,
                        start,
                        end,
                    });
                }
            }
            _ => {}
        }
        i += 1;
    }
    regions
}

fn cte_name_before(tokens: &[TokenWithSpan], lparen_index: usize) -> Option<String> {
    let mut j = lparen_index;
    loop {
        if j == 0 {
            return None;
        }
        j -= 1;
        match &tokens[j].token {
            Token::Whitespace(_) => continue,
            Token::Word(w) if w.keyword == Keyword::AS => continue,
            Token::Word(w) if w.keyword == Keyword::NoKeyword => return Some(w.value.clone()),
            _ => return None,
        }
    }
}

fn starts_subquery(tokens: &[TokenWithSpan], lparen_index: usize) -> bool {
    let mut j = lparen_index + 1;
    while let Some(t) = tokens.get(j) {
        match &t.token {
            Token::Whitespace(_) => j += 1,
            Token::Word(w) => {
                return matches!(w.keyword, Keyword::SELECT | Keyword::WITH)
            }
            _ => return false,
        }
    }
    false
}

fn scope_at(regions: &[Region], offset: usize) -> RenameScope {
    let mut best: Option<&Region> = None;
    for region in regions {
        if region.kind == RegionKind::Other {
            continue;
        }
        if region.start <= offset && offset < region.end {
            best = match best {
                Some(current) if current.end - current.start <= region.end - region.start => {
                    Some(current)
                }
                _ => Some(region),
            };
        }
    }
    match best {
        Some(region) => match (&region.kind, &region.name) {
            (RegionKind::CteBody, Some(name)) => RenameScope::CteBody(name.clone()),
            (RegionKind::Subquery, _) => RenameScope::Subquery,
            _ => RenameScope::Statement,
        },
        None => RenameScope::Statement,
    }
}

fn scope_byte_range(regions: &[Region], scope: &RenameScope, sql_len: usize) -> (usize, usize) {
    match scope {
        RenameScope::Statement => (0, sql_len),
        RenameScope::Subquery => regions
            .iter()
            .filter(|r| r.kind == RegionKind::Subquery)
            .min_by_key(|r| r.end - r.start)
            .map(|r| (r.start, r.end))
            .unwrap_or((0, sql_len)),
        RenameScope::CteBody(name) => regions
            .iter()
            .find(|r| r.kind == RegionKind::CteBody && r.name.as_deref() == Some(name.as_str()))
            .map(|r| (r.start, r.end))
            .unwrap_or((0, sql_len)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_alias_in_simple_statement() {
        let sql = "SELECT o.id FROM orders o WHERE o.id > 1";
        let col = sql.find("o.id FROM").unwrap() as u64 + 1;
        let result = rename_alias(
            sql,
            Dialect::Generic,
            (1, col),
            "o",
            "ord",
            &RenameOptions::default(),
        )
        .unwrap();
        assert!(result.success);
        let new_sql = result.new_sql.unwrap();
        assert_eq!(new_sql, "SELECT ord.id FROM orders ord WHERE ord.id > 1");
    }

    #[test]
    fn dry_run_reports_changes_without_rewriting() {
        let sql = "SELECT o.id FROM orders o";
        let col = sql.find("o.id").unwrap() as u64 + 1;
        let result = rename_alias(
            sql,
            Dialect::Generic,
            (1, col),
            "o",
            "ord",
            &RenameOptions {
                force_scope: None,
                dry_run: true,
            },
        )
        .unwrap();
        assert!(result.new_sql.is_none());
        assert_eq!(result.changes.len(), 2);
    }

    #[test]
    fn rejects_cursor_on_non_identifier() {
        let sql = "SELECT o.id FROM orders o";
        let result = rename_alias(
            sql,
            Dialect::Generic,
            (1, 1),
            "o",
            "ord",
            &RenameOptions::default(),
        );
        assert!(matches!(result, Err(TransformError::NotAnAlias)));
    }

    #[test]
    fn rejects_reserved_keyword_as_new_name() {
        let sql = "SELECT o.id FROM orders o";
        let col = sql.find("o.id").unwrap() as u64 + 1;
        let err = rename_alias(
            sql,
            Dialect::Generic,
            (1, col),
            "o",
            "select",
            &RenameOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TransformError::NameConflict(_)));
    }

    #[test]
    fn reports_conflict_with_existing_alias() {
        let sql = "SELECT o.id FROM orders o JOIN items i ON i.order_id = o.id";
        let col = sql.find("o.id").unwrap() as u64 + 1;
        let result = rename_alias(
            sql,
            Dialect::Generic,
            (1, col),
            "o",
            "i",
            &RenameOptions::default(),
        )
        .unwrap();
        assert!(!result.success);
        assert!(result.conflicts.contains(&"i".to_string()));
    }

    #[test]
    fn cte_body_scope_confines_rename() {
        let sql = "WITH recent AS (SELECT o.id FROM orders o) SELECT o.id FROM recent o";
        let col = sql.find("o.id FROM orders").unwrap() as u64 + 1;
        let result = rename_alias(
            sql,
            Dialect::Generic,
            (1, col),
            "o",
            "ord",
            &RenameOptions::default(),
        )
        .unwrap();
        assert_eq!(result.scope, RenameScope::CteBody("recent".to_string()));
        let new_sql = result.new_sql.unwrap();
        assert!(new_sql.contains("recent AS (SELECT ord.id FROM orders ord)"));
        assert!(new_sql.ends_with("SELECT o.id FROM recent o"));
    }
}
