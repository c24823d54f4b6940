//! Conditional branch node.
//!
//! Evaluates conditions against the run context and annotates the output
//! with the branch taken. It does not alter traversal: every downstream node
//! still runs, and may inspect `conditionResult`/`branch` itself.
//!
//! Config is either
//! - `conditions: [{ "field": "score", "operator": ">=", "value": 60 }, ...]`
//!   with an optional `combinator` of `all` (default) or `any`, or
//! - `expression: "score >= 60"` (`<field> <operator> [<literal>]`).

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::fields::{lookup, str_field};
use crate::traits::{ContextMap, NodeConfig, NodeContext, NodeOutput};
use crate::{ExecutableNode, NodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" | "equals" => Self::Eq,
            "!=" | "<>" | "ne" | "not_equals" => Self::Ne,
            ">" | "gt" => Self::Gt,
            "<" | "lt" => Self::Lt,
            ">=" | "gte" => Self::Ge,
            "<=" | "lte" => Self::Le,
            "contains" => Self::Contains,
            "starts_with" => Self::StartsWith,
            "ends_with" => Self::EndsWith,
            "is_empty" => Self::IsEmpty,
            "is_not_empty" => Self::IsNotEmpty,
            _ => return None,
        })
    }

    fn takes_operand(self) -> bool {
        !matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

/// A single `field operator value` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    fn from_config(raw: &Value) -> Result<Self, NodeError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| NodeError::config("each condition must be an object"))?;
        let field = str_field(obj, "field")
            .ok_or_else(|| NodeError::config("condition is missing 'field'"))?;
        let op = str_field(obj, "operator").unwrap_or("=");
        let operator =
            Operator::parse(op).ok_or_else(|| NodeError::config(format!("unknown operator '{op}'")))?;
        Ok(Self {
            field: field.to_owned(),
            operator,
            value: obj.get("value").cloned().unwrap_or(Value::Null),
        })
    }

    /// Parse `<field> <operator> [<literal>]`. The field may be written as
    /// `${field}`; the literal is read as JSON when possible, else as text.
    pub fn parse_expression(expr: &str) -> Result<Self, NodeError> {
        let expr_trimmed = expr.trim();
        let (field, rest) = expr_trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((expr_trimmed, ""));
        if field.is_empty() {
            return Err(NodeError::config("empty expression"));
        }
        let field = field
            .strip_prefix("${")
            .and_then(|f| f.strip_suffix('}'))
            .unwrap_or(field);

        let rest = rest.trim_start();
        let (op, literal) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if op.is_empty() {
            return Err(NodeError::config(format!("expression '{expr}' has no operator")));
        }
        let operator =
            Operator::parse(op).ok_or_else(|| NodeError::config(format!("unknown operator '{op}'")))?;

        let literal = literal.trim();
        if operator.takes_operand() && literal.is_empty() {
            return Err(NodeError::config(format!("expression '{expr}' has no value to compare")));
        }
        let value = serde_json::from_str(literal).unwrap_or_else(|_| Value::String(literal.to_owned()));

        Ok(Self {
            field: field.to_owned(),
            operator,
            value,
        })
    }

    pub fn evaluate(&self, data: &Map<String, Value>) -> bool {
        let actual = lookup(data, &self.field).unwrap_or(&Value::Null);
        match self.operator {
            Operator::Eq => loosely_equal(actual, &self.value),
            Operator::Ne => !loosely_equal(actual, &self.value),
            Operator::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            Operator::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            Operator::Ge => matches!(compare(actual, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Le => matches!(compare(actual, &self.value), Some(Ordering::Less | Ordering::Equal)),
            Operator::Contains => match actual {
                Value::Array(items) => items.iter().any(|item| loosely_equal(item, &self.value)),
                Value::String(s) => s.contains(text(&self.value).as_str()),
                _ => false,
            },
            Operator::StartsWith => matches!(actual, Value::String(s) if s.starts_with(text(&self.value).as_str())),
            Operator::EndsWith => matches!(actual, Value::String(s) if s.ends_with(text(&self.value).as_str())),
            Operator::IsEmpty => is_empty(actual),
            Operator::IsNotEmpty => !is_empty(actual),
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) if as_number(a).is_none() || as_number(b).is_none() => {
            Some(x.cmp(y))
        }
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

pub struct ConditionNode;

impl ConditionNode {
    fn conditions(config: &NodeConfig) -> Result<(Vec<Condition>, bool), NodeError> {
        let any = match str_field(config, "combinator").unwrap_or("all") {
            "all" | "and" => false,
            "any" | "or" => true,
            other => return Err(NodeError::config(format!("unknown combinator '{other}'"))),
        };

        if let Some(expr) = str_field(config, "expression") {
            return Ok((vec![Condition::parse_expression(expr)?], any));
        }
        match config.get("conditions") {
            Some(Value::Array(items)) if !items.is_empty() => {
                let parsed = items.iter().map(Condition::from_config).collect::<Result<_, _>>()?;
                Ok((parsed, any))
            }
            _ => Err(NodeError::config("set 'expression' or a non-empty 'conditions' list")),
        }
    }
}

#[async_trait]
impl ExecutableNode for ConditionNode {
    async fn execute(
        &self,
        input: &ContextMap,
        config: &NodeConfig,
        _ctx: &NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        let (conditions, any) = Self::conditions(config)?;
        let result = if any {
            conditions.iter().any(|c| c.evaluate(input))
        } else {
            conditions.iter().all(|c| c.evaluate(input))
        };

        let mut out = Map::new();
        out.insert("conditionResult".into(), result.into());
        out.insert("branch".into(), if result { "true" } else { "false" }.into());
        out.insert("conditionsEvaluated".into(), conditions.len().into());
        Ok(out)
    }
}
