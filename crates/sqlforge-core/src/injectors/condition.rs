use crate::error::TransformError;
use serde_json::Value as Json;

/// A leaf value a condition descriptor can carry: whatever came across the
/// wire as a JSON scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    fn from_json(value: &Json) -> Option<Self> {
        match value {
            Json::Null => Some(Scalar::Null),
            Json::Bool(b) => Some(Scalar::Bool(*b)),
            Json::Number(n) => n.as_f64().map(Scalar::Number),
            Json::String(s) => Some(Scalar::String(s.clone())),
            _ => None,
        }
    }
}

/// A single recognized comparison key inside an operator-record descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Min,
    Max,
    Like,
    ILike,
    In,
    Any,
}

impl FilterOperator {
    fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "=" | "eq" => Self::Eq,
            "!=" | "<>" | "ne" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "min" => Self::Min,
            "max" => Self::Max,
            "like" => Self::Like,
            "ilike" => Self::ILike,
            "in" => Self::In,
            "any" => Self::Any,
            _ => return None,
        })
    }

    /// Parameter-name suffix used when generating a deterministic bind name.
    pub fn name_suffix(self) -> &'static str {
        match self {
            Self::Eq => "",
            Self::Ne => "_ne",
            Self::Lt => "_lt",
            Self::Le => "_le",
            Self::Gt => "_gt",
            Self::Ge => "_ge",
            Self::Min => "_min",
            Self::Max => "_max",
            Self::Like => "_like",
            Self::ILike => "_ilike",
            Self::In => "_in",
            Self::Any => "_any",
        }
    }
}

/// One `{op: value}` or `in`/`or`/`and` term inside an operator-record descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorTerm {
    Cmp(FilterOperator, Scalar),
    In(Vec<Scalar>),
    Or(Vec<ConditionDescriptor>),
    And(Vec<ConditionDescriptor>),
}

/// An operator-record descriptor: an optional `column` override plus an
/// ordered list of recognized-key terms, combined with AND semantics
/// between terms (each term individually reflects its own operator).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorRecord {
    pub column: Option<String>,
    pub terms: Vec<OperatorTerm>,
}

/// The sum type a filter's wire-format value parses into: spec.md §4.4.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionDescriptor {
    Value(Scalar),
    Array(Vec<Scalar>),
    Operator(OperatorRecord),
}

impl ConditionDescriptor {
    /// `state_key` is the descriptor's name in the caller's filter map —
    /// used only for error messages (`UnsupportedOperator(op, name)`).
    pub fn from_json(state_key: &str, value: &Json) -> Result<Self, TransformError> {
        match value {
            Json::Array(items) => {
                let scalars = items
                    .iter()
                    .map(|v| {
                        Scalar::from_json(v).ok_or_else(|| {
                            TransformError::UnsupportedOperator {
                                op: "array-element".to_string(),
                                name: state_key.to_string(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Array(scalars))
            }
            Json::Object(map) => {
                let mut record = OperatorRecord::default();
                for (key, val) in map {
                    match key.as_str() {
                        "column" => {
                            record.column = val.as_str().map(|s| s.to_string());
                        }
                        "or" => record.terms.push(OperatorTerm::Or(parse_sub_list(
                            state_key, val,
                        )?)),
                        "and" => record.terms.push(OperatorTerm::And(parse_sub_list(
                            state_key, val,
                        )?)),
                        "in" => {
                            let Json::Array(items) = val else {
                                return Err(TransformError::UnsupportedOperator {
                                    op: "in".to_string(),
                                    name: state_key.to_string(),
                                });
                            };
                            let scalars = items
                                .iter()
                                .map(|v| {
                                    Scalar::from_json(v).ok_or_else(|| {
                                        TransformError::UnsupportedOperator {
                                            op: "in".to_string(),
                                            name: state_key.to_string(),
                                        }
                                    })
                                })
                                .collect::<Result<Vec<_>, _>>()?;
                            record.terms.push(OperatorTerm::In(scalars));
                        }
                        other => {
                            let op = FilterOperator::from_key(other).ok_or_else(|| {
                                TransformError::UnsupportedOperator {
                                    op: other.to_string(),
                                    name: state_key.to_string(),
                                }
                            })?;
                            let scalar = Scalar::from_json(val).ok_or_else(|| {
                                TransformError::UnsupportedOperator {
                                    op: other.to_string(),
                                    name: state_key.to_string(),
                                }
                            })?;
                            record.terms.push(OperatorTerm::Cmp(op, scalar));
                        }
                    }
                }
                Ok(Self::Operator(record))
            }
            other => {
                let scalar = Scalar::from_json(other).ok_or_else(|| {
                    TransformError::UnsupportedOperator {
                        op: "value".to_string(),
                        name: state_key.to_string(),
                    }
                })?;
                Ok(Self::Value(scalar))
            }
        }
    }

    pub fn explicit_column(&self) -> Option<&str> {
        match self {
            Self::Operator(record) => record.column.as_deref(),
            _ => None,
        }
    }
}

fn parse_sub_list(state_key: &str, value: &Json) -> Result<Vec<ConditionDescriptor>, TransformError> {
    let Json::Array(items) = value else {
        return Err(TransformError::UnsupportedOperator {
            op: "or/and".to_string(),
            name: state_key.to_string(),
        });
    };
    items
        .iter()
        .map(|v| ConditionDescriptor::from_json(state_key, v))
        .collect()
}
