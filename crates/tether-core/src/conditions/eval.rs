//! Evaluation of a parsed expression against a record.

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;
use tether_proto::{Parameters, Record};

use super::ast::{CompareOp, Expr, Literal, Operand};

/// Evaluate `expr` against a record with the given parameters.
pub fn evaluate(expr: &Expr, record: &Record, parameters: &Parameters) -> bool {
    let ctx = Context { record, parameters };
    ctx.eval(expr)
}

struct Context<'a> {
    record: &'a Record,
    parameters: &'a Parameters,
}

impl Context<'_> {
    fn eval(&self, expr: &Expr) -> bool {
        match expr {
            Expr::And(terms) => terms.iter().all(|t| self.eval(t)),
            Expr::Or(terms) => terms.iter().any(|t| self.eval(t)),
            Expr::Not(inner) => !self.eval(inner),
            Expr::Truthy(operand) => truthy(&self.resolve(operand)),
            Expr::Compare { left, op, right } => {
                compare(&self.resolve(left), *op, &self.resolve(right))
            }
        }
    }

    fn resolve<'v>(&'v self, operand: &'v Operand) -> Cow<'v, Value> {
        match operand {
            Operand::Property(path) => {
                let mut parts = path.iter();
                let first = parts.next().and_then(|p| self.record.get(p));
                let value = parts.fold(first, |value, part| match value {
                    Some(Value::Object(map)) => map.get(part),
                    _ => None,
                });
                value.map_or(Cow::Owned(Value::Null), Cow::Borrowed)
            }
            Operand::Parameter(name) => self
                .parameters
                .get(name)
                .map_or(Cow::Owned(Value::Null), Cow::Borrowed),
            Operand::Literal(literal) => Cow::Owned(literal_value(literal)),
            Operand::List(items) => Cow::Owned(Value::Array(
                items.iter().map(|i| self.resolve(i).into_owned()).collect(),
            )),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::from(*n),
        Literal::Float(f) => Value::from(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => equals(left, right),
        CompareOp::Ne => !equals(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::BeginsWith => match (left, right) {
            (Value::String(l), Value::String(r)) => l.starts_with(r.as_str()),
            _ => false,
        },
        CompareOp::EndsWith => match (left, right) {
            (Value::String(l), Value::String(r)) => l.ends_with(r.as_str()),
            _ => false,
        },
        CompareOp::Contains => match (left, right) {
            (Value::String(l), Value::String(r)) => l.contains(r.as_str()),
            (Value::Array(items), _) => items.iter().any(|i| equals(i, right)),
            _ => false,
        },
        CompareOp::Any => match right {
            Value::Array(items) => items.iter().any(|i| equals(left, i)),
            _ => false,
        },
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        json!({
            "title": "Write docs",
            "priority": 3,
            "score": 2.5,
            "done": false,
            "tags": ["docs", "urgent"],
            "owner": { "name": "ann" }
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn check(conditions: &str) -> bool {
        let params = json!({ "me": "ann", "levels": [1, 3] })
            .as_object()
            .cloned()
            .unwrap();
        evaluate(&parse(conditions).unwrap(), &record(), &params)
    }

    #[test]
    fn test_comparisons() {
        assert!(check("priority = 3"));
        assert!(check("priority == 3.0"));
        assert!(check("priority != 4"));
        assert!(check("priority > 2 AND priority <= 3"));
        assert!(check("score < 3"));
        assert!(!check("title > 5"));
    }

    #[test]
    fn test_string_operators() {
        assert!(check("title BEGINS_WITH 'Write'"));
        assert!(check("title ENDS_WITH \"docs\""));
        assert!(check("title CONTAINS 'te d'"));
        assert!(!check("priority BEGINS_WITH '3'"));
    }

    #[test]
    fn test_lists_and_params() {
        assert!(check("tags CONTAINS 'urgent'"));
        assert!(check("priority ANY {levels}"));
        assert!(check("priority ANY [1, 2, 3]"));
        assert!(!check("priority ANY [1, 2]"));
        assert!(check("owner.name = {me}"));
        assert!(!check("owner.name = {missing}"));
    }

    #[test]
    fn test_missing_property_is_null() {
        assert!(check("assignee = null"));
        assert!(check("owner.age = null"));
        assert!(!check("assignee"));
    }

    #[test]
    fn test_boolean_logic() {
        assert!(check("!done"));
        assert!(check("done = true OR priority = 3"));
        assert!(!check("NOT (priority = 3)"));
    }
}
