use super::{eval, fingerprint, CompareOp, LikePattern, Path};
use crate::{Error, Result, Value, ValueRecord};

/// A filter predicate, as a tagged tree.
///
/// Criteria can be built with the constructors below or parsed from the
/// mapping form, where keys beginning with `$` are operators and every other
/// key is a dotted field path:
///
/// ```
/// use keyper_core::{query::Criteria, record};
///
/// let criteria = Criteria::parse(&record! {
///     "a.b" => record! { "$gt" => 40 },
/// }.into()).unwrap();
///
/// assert!(criteria.matches(&record! { "a" => record! { "b" => 42 } }.into()));
/// ```
///
/// All malformed shapes (unknown operators, `$like` without a wildcard,
/// non-list `$in` operands) are rejected while the tree is built; evaluation
/// itself cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Matches every value; the empty criteria.
    Pass,

    And(Vec<Criteria>),
    Or(Vec<Criteria>),
    Nor(Vec<Criteria>),
    Not(Box<Criteria>),

    /// Resolves a dotted field path, then applies the nested criteria to the
    /// resolved value. Resolution through a missing field yields "undefined",
    /// which only `$ne`/`$nin` match.
    Field(Path, Box<Criteria>),

    Cmp(CompareOp, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Like(LikePattern),

    /// At least one element of a list value matches.
    AnyElement(Box<Criteria>),
    /// Every element of a list value matches.
    AllElements(Box<Criteria>),
    /// Applies the nested criteria to a list value's length.
    Length(Box<Criteria>),
}

impl Default for Criteria {
    fn default() -> Self {
        Self::Pass
    }
}

impl Criteria {
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Eq, value.into())
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Ne, value.into())
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Lt, value.into())
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Lte, value.into())
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Gt, value.into())
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::Cmp(CompareOp::Gte, value.into())
    }

    pub fn is_in<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    pub fn not_in<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::NotIn(values.into_iter().map(Into::into).collect())
    }

    pub fn like(pattern: impl Into<String>) -> Result<Self> {
        Ok(Self::Like(LikePattern::parse(pattern)?))
    }

    /// Applies `test` to the value at `path`.
    pub fn field(path: &str, test: Criteria) -> Result<Self> {
        Ok(Self::Field(Path::parse(path)?, Box::new(test)))
    }

    pub fn and(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        collapse(criteria.into_iter().collect())
    }

    pub fn or(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::Or(criteria.into_iter().collect())
    }

    pub fn nor(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::Nor(criteria.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(criteria: Criteria) -> Self {
        Self::Not(Box::new(criteria))
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Parses the mapping form.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Record(record) => parse_mapping(record),
            other => Ok(Self::eq(other.clone())),
        }
    }

    /// Tests a value against this criteria.
    pub fn matches(&self, value: &Value) -> bool {
        eval::eval(self, Some(eval::Item::Value(value)))
    }

    /// Tests an attribute record against this criteria.
    pub fn matches_record(&self, record: &ValueRecord) -> bool {
        eval::eval(self, Some(eval::Item::Record(record)))
    }

    /// The operand of a bare equality term on `field`, if this criteria has
    /// one at the top level. Used to route a filter through a secondary
    /// index.
    pub fn equality_operand(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Field(path, test) if path.single() == Some(field) => match &**test {
                Self::Cmp(CompareOp::Eq, value) => Some(value),
                _ => None,
            },
            Self::And(children) => children.iter().find_map(|c| c.equality_operand(field)),
            _ => None,
        }
    }

    /// Canonical fingerprint; structurally equal criteria share it no matter
    /// how they were built.
    pub fn fingerprint(&self) -> String {
        let mut out = String::new();
        fingerprint::write_criteria(self, &mut out);
        out
    }
}

fn collapse(mut nodes: Vec<Criteria>) -> Criteria {
    match nodes.len() {
        0 => Criteria::Pass,
        1 => nodes.pop().unwrap(),
        _ => Criteria::And(nodes),
    }
}

fn parse_mapping(record: &ValueRecord) -> Result<Criteria> {
    let mut nodes = Vec::with_capacity(record.len());

    for (name, operand) in record.iter() {
        if let Some(token) = name.strip_prefix('$') {
            nodes.push(parse_operator(token, operand)?);
        } else {
            nodes.push(Criteria::Field(
                Path::parse(name)?,
                Box::new(parse_operand(operand)?),
            ));
        }
    }

    Ok(collapse(nodes))
}

/// A bare non-mapping operand promotes to `$eq`.
fn parse_operand(value: &Value) -> Result<Criteria> {
    match value {
        Value::Record(record) => parse_mapping(record),
        other => Ok(Criteria::eq(other.clone())),
    }
}

fn parse_operator(token: &str, operand: &Value) -> Result<Criteria> {
    let criteria = match token {
        "eq" => Criteria::eq(operand.clone()),
        "ne" => Criteria::ne(operand.clone()),
        "lt" => Criteria::lt(operand.clone()),
        "lte" => Criteria::lte(operand.clone()),
        "gt" => Criteria::gt(operand.clone()),
        "gte" => Criteria::gte(operand.clone()),
        "in" => Criteria::In(parse_value_list(token, operand)?),
        "nin" => Criteria::NotIn(parse_value_list(token, operand)?),
        "like" => match operand.as_str() {
            Some(pattern) => Criteria::like(pattern)?,
            None => {
                return Err(Error::invalid_query(format!(
                    "`$like` expects a string pattern, got {operand:?}"
                )))
            }
        },
        "any" => Criteria::AnyElement(Box::new(parse_operand(operand)?)),
        "all" => Criteria::AllElements(Box::new(parse_operand(operand)?)),
        "length" => Criteria::Length(Box::new(parse_operand(operand)?)),
        "and" => Criteria::And(parse_criteria_list(token, operand)?),
        "or" => Criteria::Or(parse_criteria_list(token, operand)?),
        "nor" => Criteria::Nor(parse_criteria_list(token, operand)?),
        "not" => Criteria::not(parse_operand(operand)?),
        _ => {
            return Err(Error::invalid_query(format!("unknown operator `${token}`")));
        }
    };

    Ok(criteria)
}

fn parse_value_list(token: &str, operand: &Value) -> Result<Vec<Value>> {
    match operand.as_list() {
        Some(items) => Ok(items.to_vec()),
        None => Err(Error::invalid_query(format!(
            "`${token}` expects a list operand, got {operand:?}"
        ))),
    }
}

fn parse_criteria_list(token: &str, operand: &Value) -> Result<Vec<Criteria>> {
    match operand.as_list() {
        Some(items) => items.iter().map(Criteria::parse).collect(),
        None => Err(Error::invalid_query(format!(
            "`${token}` expects a list of criteria, got {operand:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn dotted_path_comparison() {
        let value: Value = record! { "a" => record! { "b" => 42 } }.into();

        let criteria = Criteria::parse(&record! { "a.b" => record! { "$gt" => 40 } }.into()).unwrap();
        assert!(criteria.matches(&value));

        // A missing field is not equal to anything.
        let criteria = Criteria::parse(&record! { "a.c" => record! { "$ne" => 42 } }.into()).unwrap();
        assert!(criteria.matches(&value));
    }

    #[test]
    fn like_matches_and_rejects() {
        let criteria = Criteria::parse(&record! { "$like" => "%str%" }.into()).unwrap();
        assert!(criteria.matches(&"string".into()));

        assert!(Criteria::parse(&record! { "$like" => "rrr" }.into()).is_err());
    }

    #[test]
    fn null_is_distinct_from_missing() {
        let value: Value = record! { "a" => Value::Null }.into();

        let eq_null = Criteria::field("a", Criteria::eq(Value::Null)).unwrap();
        assert!(eq_null.matches(&value));

        let eq_42 = Criteria::field("a", Criteria::eq(42)).unwrap();
        assert!(!eq_42.matches(&value));

        let ne_42 = Criteria::field("a", Criteria::ne(42)).unwrap();
        assert!(ne_42.matches(&value));
    }

    #[test]
    fn membership() {
        let value: Value = record! { "n" => 2 }.into();
        assert!(Criteria::field("n", Criteria::is_in([1, 2, 3])).unwrap().matches(&value));
        assert!(!Criteria::field("n", Criteria::not_in([1, 2, 3])).unwrap().matches(&value));
        // Missing field: $nin matches, $in does not.
        assert!(Criteria::field("m", Criteria::not_in([1])).unwrap().matches(&value));
        assert!(!Criteria::field("m", Criteria::is_in([1])).unwrap().matches(&value));
    }

    #[test]
    fn array_operators() {
        let value: Value = record! {
            "tags" => vec![Value::from("a"), Value::from("ab"), Value::from("abc")],
        }
        .into();

        let any = Criteria::parse(
            &record! { "tags" => record! { "$any" => record! { "$like" => "ab%" } } }.into(),
        )
        .unwrap();
        assert!(any.matches(&value));

        let all = Criteria::parse(
            &record! { "tags" => record! { "$all" => record! { "$like" => "ab%" } } }.into(),
        )
        .unwrap();
        assert!(!all.matches(&value));

        // Bare number under $length promotes to $eq.
        let length = Criteria::parse(&record! { "tags" => record! { "$length" => 3 } }.into()).unwrap();
        assert!(length.matches(&value));
    }

    #[test]
    fn logical_operators_apply_to_the_same_value() {
        let value: Value = record! { "n" => 5 }.into();

        let or = Criteria::parse(
            &record! {
                "$or" => vec![
                    Value::from(record! { "n" => record! { "$lt" => 3 } }),
                    Value::from(record! { "n" => record! { "$gt" => 4 } }),
                ],
            }
            .into(),
        )
        .unwrap();
        assert!(or.matches(&value));

        let nor = Criteria::parse(
            &record! {
                "$nor" => vec![
                    Value::from(record! { "n" => record! { "$lt" => 3 } }),
                    Value::from(record! { "n" => record! { "$gt" => 4 } }),
                ],
            }
            .into(),
        )
        .unwrap();
        assert!(!nor.matches(&value));

        let not = Criteria::parse(
            &record! { "$not" => record! { "n" => record! { "$lt" => 3 } } }.into(),
        )
        .unwrap();
        assert!(not.matches(&value));
    }

    #[test]
    fn bare_operand_promotes_to_equality() {
        let criteria = Criteria::parse(&record! { "name" => "ada" }.into()).unwrap();
        assert!(criteria.matches(&record! { "name" => "ada" }.into()));
        assert!(!criteria.matches(&record! { "name" => "grace" }.into()));
    }

    #[test]
    fn equality_operand_is_found_through_and_groups() {
        let criteria = Criteria::parse(
            &record! {
                "author_id" => 7,
                "text" => record! { "$like" => "a%" },
            }
            .into(),
        )
        .unwrap();

        assert_eq!(criteria.equality_operand("author_id"), Some(&Value::I64(7)));
        assert_eq!(criteria.equality_operand("text"), None);
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(Criteria::parse(&record! { "$exists" => true }.into()).is_err());
    }

    #[test]
    fn empty_mapping_passes_everything() {
        let criteria = Criteria::parse(&record! {}.into()).unwrap();
        assert!(criteria.is_pass());
        assert!(criteria.matches(&Value::Null));
    }
}
