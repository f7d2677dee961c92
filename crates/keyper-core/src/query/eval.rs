//! Criteria evaluation.
//!
//! Evaluation is a dispatch over the criteria tags against an optional
//! target: `None` is "undefined" (a missing field), which only the negative
//! operators match. Records evaluate without being wrapped in a `Value`, so
//! testing a cached entity never clones its attribute map.

use super::{CompareOp, Criteria};
use crate::{value_cmp, Value, ValueRecord};

use std::cmp::Ordering;

#[derive(Clone, Copy)]
pub(super) enum Item<'a> {
    Value(&'a Value),
    Record(&'a ValueRecord),
}

impl<'a> Item<'a> {
    fn as_value(self) -> Option<&'a Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Record(_) => None,
        }
    }

    fn as_list(self) -> Option<&'a [Value]> {
        self.as_value().and_then(Value::as_list)
    }
}

pub(super) fn eval(criteria: &Criteria, item: Option<Item<'_>>) -> bool {
    match criteria {
        Criteria::Pass => true,

        Criteria::And(children) => children.iter().all(|c| eval(c, item)),
        Criteria::Or(children) => children.iter().any(|c| eval(c, item)),
        Criteria::Nor(children) => !children.iter().any(|c| eval(c, item)),
        Criteria::Not(child) => !eval(child, item),

        Criteria::Field(path, test) => {
            let resolved = match item {
                Some(Item::Record(record)) => path.resolve_record(record),
                Some(Item::Value(value)) => path.resolve(value),
                None => None,
            };
            eval(test, resolved.map(Item::Value))
        }

        Criteria::Cmp(op, operand) => eval_cmp(*op, item, operand),

        Criteria::In(operands) => match item.and_then(Item::as_value) {
            Some(value) => operands.iter().any(|o| value_cmp::values_eq(value, o)),
            None => false,
        },
        Criteria::NotIn(operands) => match item.and_then(Item::as_value) {
            Some(value) => !operands.iter().any(|o| value_cmp::values_eq(value, o)),
            None => true,
        },

        Criteria::Like(pattern) => item
            .and_then(Item::as_value)
            .and_then(Value::as_str)
            .map(|s| pattern.matches(s))
            .unwrap_or(false),

        Criteria::AnyElement(test) => match item.and_then(Item::as_list) {
            Some(items) => items.iter().any(|v| eval(test, Some(Item::Value(v)))),
            None => false,
        },
        Criteria::AllElements(test) => match item.and_then(Item::as_list) {
            Some(items) => items.iter().all(|v| eval(test, Some(Item::Value(v)))),
            None => false,
        },
        Criteria::Length(test) => match item.and_then(Item::as_list) {
            Some(items) => {
                let len = Value::U64(items.len() as u64);
                eval(test, Some(Item::Value(&len)))
            }
            None => false,
        },
    }
}

fn eval_cmp(op: CompareOp, item: Option<Item<'_>>, operand: &Value) -> bool {
    let value = match item {
        // Undefined: not equal to anything, not ordered against anything.
        None => return matches!(op, CompareOp::Ne),
        Some(Item::Record(record)) => {
            return match (op, operand) {
                (CompareOp::Eq, Value::Record(other)) => record == other,
                (CompareOp::Ne, Value::Record(other)) => record != other,
                (CompareOp::Ne, _) => true,
                _ => false,
            };
        }
        Some(Item::Value(value)) => value,
    };

    match op {
        CompareOp::Eq => value_cmp::values_eq(value, operand),
        CompareOp::Ne => !value_cmp::values_eq(value, operand),
        CompareOp::Lt => ordered(value, operand, |o| o == Ordering::Less),
        CompareOp::Lte => ordered(value, operand, |o| o != Ordering::Greater),
        CompareOp::Gt => ordered(value, operand, |o| o == Ordering::Greater),
        CompareOp::Gte => ordered(value, operand, |o| o != Ordering::Less),
    }
}

fn ordered(value: &Value, operand: &Value, test: impl FnOnce(Ordering) -> bool) -> bool {
    value_cmp::partial_cmp(value, operand).map(test).unwrap_or(false)
}
