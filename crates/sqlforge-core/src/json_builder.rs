//! Shapes a SELECT's output as a nested JSON document via progressive CTE
//! synthesis: one CTE per object-typed entity (parent before child), one CTE
//! per array-typed entity (deepest first), then a final `jsonb_build_object`
//! projection.

use crate::collectors::SelectValueCollector;
use crate::error::TransformError;
use serde::Deserialize;
use sqlparser::ast::helpers::attached_token::AttachedToken;
use sqlparser::ast::{
    Cte, CteAsMaterialized, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments,
    FunctionArgumentList, GroupByExpr, Ident, ObjectName, ObjectNamePart, Query, Select,
    SelectFlavor, SelectItem, SetExpr, TableAlias, TableFactor, TableWithJoins, Value, With,
};
use std::collections::HashMap;

/// Whether a nested entity produces a JSON object or a JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipType {
    Object,
    Array,
}

/// Whether the root of the mapping should come back as a single object or an
/// array of objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    Array,
    Single,
}

/// One entity in the mapping tree: the root, or a nested object/array child.
#[derive(Debug, Clone)]
pub struct JsonEntity {
    pub id: String,
    pub name: String,
    /// json key → source column name, in insertion order.
    pub columns: Vec<(String, String)>,
    pub parent_id: Option<String>,
    pub property_name: Option<String>,
    pub relationship_type: RelationshipType,
}

/// Normalized form of the wire-format JSON mapping (spec.md §4.5/§6).
#[derive(Debug, Clone)]
pub struct JsonMapping {
    pub root_name: String,
    pub root_entity: JsonEntity,
    pub nested_entities: Vec<JsonEntity>,
    pub result_format: ResultFormat,
}

impl JsonMapping {
    fn entity(&self, id: &str) -> Option<&JsonEntity> {
        if self.root_entity.id == id {
            return Some(&self.root_entity);
        }
        self.nested_entities.iter().find(|e| e.id == id)
    }

    fn children_of(&self, id: &str) -> Vec<&JsonEntity> {
        self.nested_entities
            .iter()
            .filter(|e| e.parent_id.as_deref() == Some(id))
            .collect()
    }

    fn depth_of(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(entity) = self.entity(current) {
            match &entity.parent_id {
                Some(parent) => {
                    depth += 1;
                    current = parent;
                }
                None => break,
            }
        }
        depth
    }

    fn validate(&self, select_columns: &[String]) -> Result<(), TransformError> {
        for entity in std::iter::once(&self.root_entity).chain(self.nested_entities.iter()) {
            for (_, source_column) in &entity.columns {
                if !select_columns.iter().any(|c| c == source_column) {
                    return Err(TransformError::MappingValidationError(format!(
                        "entity '{}' references unknown source column '{source_column}'",
                        entity.id
                    )));
                }
            }
        }

        for entity in &self.nested_entities {
            let Some(parent_id) = &entity.parent_id else {
                return Err(TransformError::MappingValidationError(format!(
                    "nested entity '{}' is missing a parent_id",
                    entity.id
                )));
            };
            if self.entity(parent_id).is_none() {
                return Err(TransformError::MappingValidationError(format!(
                    "entity '{}' has unknown parent_id '{parent_id}'",
                    entity.id
                )));
            }
        }

        let all_ids: Vec<&str> = std::iter::once(self.root_entity.id.as_str())
            .chain(self.nested_entities.iter().map(|e| e.id.as_str()))
            .collect();
        for id in &all_ids {
            if self.depth_of(id) > all_ids.len() {
                return Err(TransformError::MappingValidationError(format!(
                    "entity '{id}' participates in a parent cycle"
                )));
            }
        }

        for parent_id in std::iter::once(&self.root_entity.id)
            .chain(self.nested_entities.iter().map(|e| &e.id))
        {
            let array_children = self
                .children_of(parent_id)
                .into_iter()
                .filter(|c| c.relationship_type == RelationshipType::Array)
                .count();
            if array_children > 1 {
                return Err(TransformError::MappingValidationError(format!(
                    "entity '{parent_id}' has more than one direct array child"
                )));
            }

            let mut seen_names = std::collections::HashSet::new();
            for child in self.children_of(parent_id) {
                let Some(name) = &child.property_name else {
                    return Err(TransformError::MappingValidationError(format!(
                        "nested entity '{}' is missing a property_name",
                        child.id
                    )));
                };
                if !seen_names.insert(name) {
                    return Err(TransformError::MappingValidationError(format!(
                        "siblings under '{parent_id}' share property_name '{name}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Converts the hierarchical model-driven wire format (spec.md §6) into
    /// the normalized form, hoisting every `type = "string"` field into the
    /// returned `protected_string_fields` list (dotted paths from the root).
    pub fn from_model_driven(
        input: &ModelDrivenMapping,
        result_format: ResultFormat,
    ) -> (JsonMapping, Vec<String>) {
        let mut root_columns = Vec::new();
        let mut build = ModelBuild::default();
        for (field, value) in &input.structure {
            collect_model_field(field, value, "root", field, field, &mut root_columns, &mut build);
        }
        let mapping = JsonMapping {
            root_name: input.type_info.name.clone(),
            root_entity: JsonEntity {
                id: "root".into(),
                name: input.type_info.name.clone(),
                columns: root_columns,
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities: build.nested_entities,
            result_format,
        };
        (mapping, build.protected_string_fields)
    }

    /// Converts the legacy flat wire format (spec.md §6) into the normalized
    /// form: one root entity from `columns`, plus one nested entity per
    /// `relationships` entry (`hasMany` → array, `hasOne` → object).
    pub fn from_legacy_flat(
        input: &LegacyFlatMapping,
        root_name: &str,
        result_format: ResultFormat,
    ) -> JsonMapping {
        let root_columns = input
            .columns
            .iter()
            .map(|c| (c.clone(), c.clone()))
            .collect();
        let mut relationships: Vec<(&String, &LegacyRelationship)> =
            input.relationships.iter().collect();
        relationships.sort_by(|a, b| a.0.cmp(b.0));
        let nested_entities = relationships
            .into_iter()
            .map(|(property, rel)| JsonEntity {
                id: property.clone(),
                name: property.clone(),
                columns: rel.columns.iter().map(|c| (c.clone(), c.clone())).collect(),
                parent_id: Some("root".into()),
                property_name: Some(property.clone()),
                relationship_type: match rel.kind {
                    LegacyRelationshipKind::HasMany => RelationshipType::Array,
                    LegacyRelationshipKind::HasOne => RelationshipType::Object,
                },
            })
            .collect();
        JsonMapping {
            root_name: root_name.to_string(),
            root_entity: JsonEntity {
                id: "root".into(),
                name: root_name.to_string(),
                columns: root_columns,
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities,
            result_format,
        }
    }
}

/// Wire format for the model-driven JSON mapping input (spec.md §6):
/// `{ type_info, structure }`, where `structure` maps a JSON field name to
/// either a plain column reference or a nested object/array entity.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDrivenMapping {
    pub type_info: ModelTypeInfo,
    pub structure: HashMap<String, ModelField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTypeInfo {
    pub name: String,
}

/// One entry in a model-driven `structure` map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelField {
    /// `field: "column_name"`.
    Column(String),
    /// `field: { column, type? }` — `type = "string"` is hoisted into
    /// `protected_string_fields` by [`JsonMapping::from_model_driven`].
    ColumnWithType {
        column: String,
        #[serde(rename = "type", default)]
        field_type: Option<String>,
    },
    /// `field: { type: object|array, from, structure }`.
    Nested {
        #[serde(rename = "type")]
        kind: NestedKind,
        from: String,
        structure: HashMap<String, ModelField>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestedKind {
    Object,
    Array,
}

/// Accumulates output while walking a model-driven `structure` tree.
#[derive(Default)]
struct ModelBuild {
    nested_entities: Vec<JsonEntity>,
    protected_string_fields: Vec<String>,
}

/// `id` is an underscore-joined ancestor chain used as the entity's id (and
/// from there, as a SQL identifier for its CTE name) — it must never contain
/// a `.`. `path` is the dot-joined field path reported to the caller in
/// `protected_string_fields`, matching the wire format's own field nesting.
fn collect_model_field(
    field: &str,
    value: &ModelField,
    parent_id: &str,
    id: &str,
    path: &str,
    own_columns: &mut Vec<(String, String)>,
    build: &mut ModelBuild,
) {
    match value {
        ModelField::Column(column) => own_columns.push((field.to_string(), column.clone())),
        ModelField::ColumnWithType { column, field_type } => {
            own_columns.push((field.to_string(), column.clone()));
            if field_type.as_deref() == Some("string") {
                build.protected_string_fields.push(path.to_string());
            }
        }
        ModelField::Nested {
            kind,
            from,
            structure,
        } => {
            let entity_id = id.to_string();
            let mut columns = Vec::new();
            for (child_field, child_value) in structure {
                let child_id = format!("{id}_{child_field}");
                let child_path = format!("{path}.{child_field}");
                collect_model_field(
                    child_field,
                    child_value,
                    &entity_id,
                    &child_id,
                    &child_path,
                    &mut columns,
                    build,
                );
            }
            build.nested_entities.push(JsonEntity {
                id: entity_id,
                name: from.clone(),
                columns,
                parent_id: Some(parent_id.to_string()),
                property_name: Some(field.to_string()),
                relationship_type: match kind {
                    NestedKind::Object => RelationshipType::Object,
                    NestedKind::Array => RelationshipType::Array,
                },
            });
        }
    }
}

/// Wire format for the legacy flat JSON mapping input (spec.md §6):
/// `{ columns, relationships }`.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyFlatMapping {
    pub columns: Vec<String>,
    #[serde(default)]
    pub relationships: HashMap<String, LegacyRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRelationship {
    #[serde(rename = "type")]
    pub kind: LegacyRelationshipKind,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegacyRelationshipKind {
    HasMany,
    HasOne,
}

/// Rewrites `query` into a CTE pipeline whose final SELECT emits one JSONB
/// column shaped per `mapping`. Fails with `JsonbRequired` unless `jsonb` is
/// true — the builder has no non-JSONB strategy because plain JSON cannot be
/// grouped by in the target dialect.
pub fn build_json_query(
    query: &Query,
    mapping: &JsonMapping,
    jsonb: bool,
) -> Result<Query, TransformError> {
    if !jsonb {
        return Err(TransformError::JsonbRequired);
    }

    let select_columns: Vec<String> = SelectValueCollector::new()
        .collect(query)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    mapping.validate(&select_columns)?;

    let mut ctes = Vec::new();
    ctes.push(make_cte("origin_query", query.clone()));

    let mut generated_column: HashMap<String, String> = HashMap::new();
    let mut current_columns = select_columns.clone();
    let mut last_cte = "origin_query".to_string();

    let mut object_entities: Vec<&JsonEntity> = mapping
        .nested_entities
        .iter()
        .filter(|e| e.relationship_type == RelationshipType::Object)
        .collect();
    object_entities.sort_by_key(|e| mapping.depth_of(&e.id));

    for entity in object_entities {
        let column_name = format!("json_{}", entity.id);
        let object_expr = build_object_expr(mapping, entity, &generated_column);
        let projection = current_columns
            .iter()
            .map(|c| select_ident(c))
            .chain(std::iter::once(SelectItem::ExprWithAlias {
                expr: object_expr,
                alias: Ident::new(column_name.clone()),
            }))
            .collect();
        let cte_name = format!("with_{}", entity.id);
        let select = plain_select(projection, from_cte(&last_cte));
        ctes.push(make_cte(&cte_name, wrap_select(select)));
        generated_column.insert(entity.id.clone(), column_name.clone());
        current_columns.push(column_name);
        last_cte = cte_name;
    }

    let mut array_entities: Vec<&JsonEntity> = mapping
        .nested_entities
        .iter()
        .filter(|e| e.relationship_type == RelationshipType::Array)
        .collect();
    array_entities.sort_by_key(|e| std::cmp::Reverse(mapping.depth_of(&e.id)));

    for entity in array_entities {
        if entity.parent_id.is_none() {
            continue;
        }
        let property = entity
            .property_name
            .clone()
            .unwrap_or_else(|| entity.id.clone());
        let array_expr = Expr::Function(jsonb_agg(build_object_expr(
            mapping,
            entity,
            &generated_column,
        )));

        // Group by the parent row's key set: every column currently in scope
        // that isn't owned by this entity or one of its own descendants, since
        // those are the columns being collapsed into the aggregate.
        let own_scope = entity_subtree_columns(mapping, &entity.id, &generated_column);
        let group_columns: Vec<String> = current_columns
            .iter()
            .filter(|c| !own_scope.contains(*c))
            .cloned()
            .collect();

        let projection = group_columns
            .iter()
            .map(|c| select_ident(c))
            .chain(std::iter::once(SelectItem::ExprWithAlias {
                expr: array_expr,
                alias: Ident::new(property.clone()),
            }))
            .collect();
        let mut select = plain_select(projection, from_cte(&last_cte));
        select.group_by = GroupByExpr::Expressions(
            group_columns.iter().map(|c| ident_expr(c)).collect(),
            Vec::new(),
        );
        let cte_name = format!("with_{}", entity.id);
        ctes.push(make_cte(&cte_name, wrap_select(select)));
        generated_column.insert(entity.id.clone(), property.clone());
        current_columns = group_columns;
        current_columns.push(property);
        last_cte = cte_name;
    }

    let root_object = build_object_expr(mapping, &mapping.root_entity, &generated_column);
    let final_select = match mapping.result_format {
        ResultFormat::Array => {
            let projection = vec![SelectItem::ExprWithAlias {
                expr: Expr::Function(jsonb_agg(root_object)),
                alias: Ident::new(format!("{}_array", mapping.root_name)),
            }];
            plain_select(projection, from_cte(&last_cte))
        }
        ResultFormat::Single => {
            let projection = vec![SelectItem::ExprWithAlias {
                expr: root_object,
                alias: Ident::new(mapping.root_name.clone()),
            }];
            let mut select = plain_select(projection, from_cte(&last_cte));
            select.top = None;
            select
        }
    };

    let mut final_query = wrap_select(final_select);
    if mapping.result_format == ResultFormat::Single {
        use sqlparser::ast::LimitClause;
        final_query.limit_clause = Some(LimitClause::LimitOffset {
            limit: Some(Expr::value(Value::Number("1".to_string(), false))),
            offset: None,
            limit_by: Vec::new(),
        });
    }
    final_query.with = Some(With {
        with_token: AttachedToken::empty(),
        recursive: false,
        cte_tables: ctes,
    });

    Ok(final_query)
}

/// Source and generated column names owned by `entity_id` or any of its
/// descendants — the columns that a GROUP BY collapsing that entity must
/// exclude from its key set.
fn entity_subtree_columns(
    mapping: &JsonMapping,
    entity_id: &str,
    generated_column: &HashMap<String, String>,
) -> std::collections::HashSet<String> {
    let mut columns = std::collections::HashSet::new();
    let mut stack = vec![entity_id.to_string()];
    while let Some(id) = stack.pop() {
        if let Some(entity) = mapping.entity(&id) {
            for (_, source) in &entity.columns {
                columns.insert(source.clone());
            }
        }
        if let Some(generated) = generated_column.get(&id) {
            columns.insert(generated.clone());
        }
        for child in mapping.children_of(&id) {
            stack.push(child.id.clone());
        }
    }
    columns
}

fn build_object_expr(
    mapping: &JsonMapping,
    entity: &JsonEntity,
    generated_column: &HashMap<String, String>,
) -> Expr {
    let mut pairs: Vec<Expr> = Vec::new();
    for (key, source_column) in &entity.columns {
        pairs.push(Expr::value(Value::SingleQuotedString(key.clone())));
        pairs.push(ident_expr(source_column));
    }
    for child in mapping.children_of(&entity.id) {
        let Some(property) = &child.property_name else {
            continue;
        };
        let Some(column) = generated_column.get(&child.id) else {
            continue;
        };
        pairs.push(Expr::value(Value::SingleQuotedString(property.clone())));
        pairs.push(ident_expr(column));
    }
    Expr::Function(jsonb_build_object(pairs))
}

fn jsonb_build_object(args: Vec<Expr>) -> Function {
    call("jsonb_build_object", args)
}

fn jsonb_agg(arg: Expr) -> Function {
    call("jsonb_agg", vec![arg])
}

fn call(name: &str, args: Vec<Expr>) -> Function {
    Function {
        name: ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]),
        uses_odbc_syntax: false,
        parameters: FunctionArguments::None,
        args: FunctionArguments::List(FunctionArgumentList {
            duplicate_treatment: None,
            args: args
                .into_iter()
                .map(|e| FunctionArg::Unnamed(FunctionArgExpr::Expr(e)))
                .collect(),
            clauses: Vec::new(),
        }),
        filter: None,
        null_treatment: None,
        over: None,
        within_group: Vec::new(),
    }
}

fn ident_expr(name: &str) -> Expr {
    Expr::Identifier(Ident::new(name))
}

fn select_ident(name: &str) -> SelectItem {
    SelectItem::UnnamedExpr(ident_expr(name))
}

fn from_cte(name: &str) -> Vec<TableWithJoins> {
    vec![TableWithJoins {
        relation: TableFactor::Table {
            name: ObjectName(vec![ObjectNamePart::Identifier(Ident::new(name))]),
            alias: None,
            args: None,
            with_hints: Vec::new(),
            version: None,
            with_ordinality: false,
            partitions: Vec::new(),
            json_path: None,
            sample: None,
            index_hints: Vec::new(),
        },
        joins: Vec::new(),
    }]
}

fn plain_select(projection: Vec<SelectItem>, from: Vec<TableWithJoins>) -> Select {
    Select {
        select_token: AttachedToken::empty(),
        distinct: None,
        top: None,
        top_before_distinct: false,
        projection,
        exclude: None,
        into: None,
        from,
        lateral_views: Vec::new(),
        prewhere: None,
        selection: None,
        group_by: GroupByExpr::Expressions(Vec::new(), Vec::new()),
        cluster_by: Vec::new(),
        distribute_by: Vec::new(),
        sort_by: Vec::new(),
        having: None,
        named_window: Vec::new(),
        qualify: None,
        window_before_qualify: false,
        value_table_mode: None,
        connect_by: None,
        flavor: SelectFlavor::Standard,
    }
}

fn wrap_select(select: Select) -> Query {
    Query {
        with: None,
        body: Box::new(SetExpr::Select(Box::new(select))),
        order_by: None,
        limit_clause: None,
        fetch: None,
        locks: Vec::new(),
        for_clause: None,
        settings: None,
        format_clause: None,
        pipe_operators: Vec::new(),
    }
}

fn make_cte(name: &str, query: Query) -> Cte {
    Cte {
        alias: TableAlias {
            name: Ident::new(name),
            columns: Vec::new(),
        },
        query: Box::new(query),
        from: None,
        materialized: None::<CteAsMaterialized>,
        closing_paren_token: AttachedToken::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_one;
    use crate::types::Dialect;
    use sqlparser::ast::Statement;

    fn query_of(sql: &str) -> Query {
        match parse_one(sql, Dialect::Generic).unwrap() {
            Statement::Query(q) => *q,
            _ => panic!("expected a query"),
        }
    }

    fn simple_mapping() -> JsonMapping {
        JsonMapping {
            root_name: "orders".into(),
            root_entity: JsonEntity {
                id: "order".into(),
                name: "order".into(),
                columns: vec![("id".into(), "id".into()), ("total".into(), "total".into())],
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities: Vec::new(),
            result_format: ResultFormat::Array,
        }
    }

    #[test]
    fn builds_flat_array_result() {
        let q = query_of("SELECT id, total FROM orders");
        let mapping = simple_mapping();
        let result = build_json_query(&q, &mapping, true).unwrap();
        let sql = result.to_string();
        assert!(sql.contains("WITH origin_query AS"));
        assert!(sql.contains("jsonb_agg"));
        assert!(sql.contains("orders_array"));
    }

    #[test]
    fn rejects_non_jsonb() {
        let q = query_of("SELECT id FROM orders");
        let mapping = simple_mapping();
        let err = build_json_query(&q, &mapping, false).unwrap_err();
        assert_eq!(err, TransformError::JsonbRequired);
    }

    #[test]
    fn rejects_unknown_source_column() {
        let q = query_of("SELECT id FROM orders");
        let mut mapping = simple_mapping();
        mapping.root_entity.columns.push(("ghost".into(), "ghost_col".into()));
        let err = build_json_query(&q, &mapping, true).unwrap_err();
        assert!(matches!(err, TransformError::MappingValidationError(_)));
    }

    #[test]
    fn object_and_array_children_compose() {
        let q = query_of(
            "SELECT o.id, o.total, c.name AS customer_name, i.sku, i.qty \
             FROM orders o JOIN customers c ON c.id = o.customer_id \
             JOIN items i ON i.order_id = o.id",
        );
        let mapping = JsonMapping {
            root_name: "orders".into(),
            root_entity: JsonEntity {
                id: "order".into(),
                name: "order".into(),
                columns: vec![("id".into(), "id".into()), ("total".into(), "total".into())],
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities: vec![
                JsonEntity {
                    id: "customer".into(),
                    name: "customer".into(),
                    columns: vec![("name".into(), "customer_name".into())],
                    parent_id: Some("order".into()),
                    property_name: Some("customer".into()),
                    relationship_type: RelationshipType::Object,
                },
                JsonEntity {
                    id: "item".into(),
                    name: "item".into(),
                    columns: vec![("sku".into(), "sku".into()), ("qty".into(), "qty".into())],
                    parent_id: Some("order".into()),
                    property_name: Some("items".into()),
                    relationship_type: RelationshipType::Array,
                },
            ],
            result_format: ResultFormat::Array,
        };
        let result = build_json_query(&q, &mapping, true).unwrap();
        let sql = result.to_string();
        assert!(sql.contains("with_customer"));
        assert!(sql.contains("with_item"));
        assert!(sql.contains("'customer'"));
        assert!(sql.contains("'items'"));
    }

    #[test]
    fn duplicate_property_names_rejected() {
        let q = query_of("SELECT o.id, c.a, c.b FROM orders o JOIN c2 c ON true");
        let mapping = JsonMapping {
            root_name: "orders".into(),
            root_entity: JsonEntity {
                id: "order".into(),
                name: "order".into(),
                columns: vec![("id".into(), "id".into())],
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities: vec![
                JsonEntity {
                    id: "x".into(),
                    name: "x".into(),
                    columns: vec![("a".into(), "a".into())],
                    parent_id: Some("order".into()),
                    property_name: Some("same".into()),
                    relationship_type: RelationshipType::Object,
                },
                JsonEntity {
                    id: "y".into(),
                    name: "y".into(),
                    columns: vec![("b".into(), "b".into())],
                    parent_id: Some("order".into()),
                    property_name: Some("same".into()),
                    relationship_type: RelationshipType::Object,
                },
            ],
            result_format: ResultFormat::Array,
        };
        let err = build_json_query(&q, &mapping, true).unwrap_err();
        assert!(matches!(err, TransformError::MappingValidationError(_)));
    }

    #[test]
    fn nested_array_grouping_excludes_descendant_aggregate_column() {
        // order -> item (array) -> item_tag (array nested under item).
        // Collapsing `item` must exclude the `tags` column item_tag already
        // aggregated, not just item's own `sku`/`qty` — otherwise the outer
        // GROUP BY would key on a column that varies per item and the
        // aggregation over items would never collapse duplicate rows.
        let q = query_of(
            "SELECT o.id, i.sku, t.label \
             FROM orders o JOIN items i ON i.order_id = o.id \
             JOIN item_tags t ON t.item_id = i.id",
        );
        let mapping = JsonMapping {
            root_name: "orders".into(),
            root_entity: JsonEntity {
                id: "order".into(),
                name: "order".into(),
                columns: vec![("id".into(), "id".into())],
                parent_id: None,
                property_name: None,
                relationship_type: RelationshipType::Object,
            },
            nested_entities: vec![
                JsonEntity {
                    id: "item".into(),
                    name: "item".into(),
                    columns: vec![("sku".into(), "sku".into())],
                    parent_id: Some("order".into()),
                    property_name: Some("items".into()),
                    relationship_type: RelationshipType::Array,
                },
                JsonEntity {
                    id: "item_tag".into(),
                    name: "item_tag".into(),
                    columns: vec![("label".into(), "label".into())],
                    parent_id: Some("item".into()),
                    property_name: Some("tags".into()),
                    relationship_type: RelationshipType::Array,
                },
            ],
            result_format: ResultFormat::Array,
        };
        let result = build_json_query(&q, &mapping, true).unwrap();
        let sql = result.to_string();
        assert!(sql.contains("GROUP BY id, sku"), "sql was: {sql}");
        assert!(!sql.contains("GROUP BY id, sku, tags"), "sql was: {sql}");
        assert!(sql.contains("'tags', tags"), "sql was: {sql}");
    }

    #[test]
    fn from_model_driven_hoists_protected_string_fields_and_builds_tree() {
        let json = serde_json::json!({
            "type_info": {"name": "order"},
            "structure": {
                "id": "order_id",
                "total": {"column": "total", "type": "string"},
                "customer": {
                    "type": "object",
                    "from": "customer",
                    "structure": {
                        "name": {"column": "customer_name", "type": "string"}
                    }
                },
                "items": {
                    "type": "array",
                    "from": "item",
                    "structure": {
                        "sku": "sku"
                    }
                }
            }
        });
        let input: ModelDrivenMapping = serde_json::from_value(json).unwrap();
        let (mapping, protected) =
            JsonMapping::from_model_driven(&input, ResultFormat::Single);

        assert_eq!(mapping.root_name, "order");
        assert_eq!(mapping.root_entity.id, "root");
        assert!(mapping
            .root_entity
            .columns
            .contains(&("id".to_string(), "order_id".to_string())));
        assert!(mapping
            .root_entity
            .columns
            .contains(&("total".to_string(), "total".to_string())));

        let customer = mapping.nested_entities.iter().find(|e| e.name == "customer").unwrap();
        assert_eq!(customer.parent_id.as_deref(), Some("root"));
        assert_eq!(customer.relationship_type, RelationshipType::Object);

        let items = mapping.nested_entities.iter().find(|e| e.name == "item").unwrap();
        assert_eq!(items.relationship_type, RelationshipType::Array);
        assert_eq!(items.property_name.as_deref(), Some("items"));

        let mut protected = protected;
        protected.sort();
        assert_eq!(protected, vec!["customer.name".to_string(), "total".to_string()]);
    }

    #[test]
    fn from_legacy_flat_maps_has_many_to_array_and_has_one_to_object() {
        let json = serde_json::json!({
            "columns": ["id", "total"],
            "relationships": {
                "items": {"type": "hasMany", "columns": ["sku", "qty"]},
                "customer": {"type": "hasOne", "columns": ["name"]}
            }
        });
        let input: LegacyFlatMapping = serde_json::from_value(json).unwrap();
        let mapping = JsonMapping::from_legacy_flat(&input, "order", ResultFormat::Array);

        assert_eq!(mapping.root_entity.columns.len(), 2);
        let items = mapping.nested_entities.iter().find(|e| e.id == "items").unwrap();
        assert_eq!(items.relationship_type, RelationshipType::Array);
        let customer = mapping.nested_entities.iter().find(|e| e.id == "customer").unwrap();
        assert_eq!(customer.relationship_type, RelationshipType::Object);

        let q = query_of("SELECT id, total, sku, qty, name FROM orders");
        build_json_query(&q, &mapping, true).unwrap();
    }
}
