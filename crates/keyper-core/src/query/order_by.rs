use super::OrderByExpr;
use crate::{Result, ValueRecord};

use std::cmp::Ordering;

/// A compound ordering: components apply in sequence and short-circuit on
/// the first non-equal result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderBy {
    pub exprs: Vec<OrderByExpr>,
}

impl OrderBy {
    /// Parses a single-component spec such as `"name"` or `"age-"`.
    pub fn parse(spec: &str) -> Result<Self> {
        Ok(OrderByExpr::parse(spec)?.into())
    }

    /// Parses a multi-component spec.
    pub fn parse_all<I, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            exprs: specs
                .into_iter()
                .map(|spec| OrderByExpr::parse(spec.as_ref()))
                .collect::<Result<_>>()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn compare_records(&self, a: &ValueRecord, b: &ValueRecord) -> Ordering {
        for expr in &self.exprs {
            let ordering = expr.compare_records(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub(crate) fn write_fingerprint(&self, out: &mut String) {
        for (i, expr) in self.exprs.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&expr.path.to_string());
            out.push(expr.direction.suffix());
        }
    }
}

impl From<OrderByExpr> for OrderBy {
    fn from(value: OrderByExpr) -> Self {
        Self { exprs: vec![value] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record, Value};

    fn rows() -> Vec<ValueRecord> {
        vec![record! { "a" => 2 }, record! { "a" => 3 }, record! { "a" => 1 }]
    }

    #[test]
    fn sorts_descending() {
        let order = OrderBy::parse("a-").unwrap();
        let mut rows = rows();
        rows.sort_by(|x, y| order.compare_records(x, y));

        let sorted: Vec<_> = rows.iter().map(|r| r.get("a").unwrap().clone()).collect();
        assert_eq!(sorted, vec![Value::I64(3), Value::I64(2), Value::I64(1)]);
    }

    #[test]
    fn ascending_is_the_reverse_of_descending() {
        let asc = OrderBy::parse("a+").unwrap();
        let desc = OrderBy::parse("a-").unwrap();
        let rows = rows();

        for x in &rows {
            for y in &rows {
                assert_eq!(asc.compare_records(x, y), desc.compare_records(x, y).reverse());
            }
        }
    }

    #[test]
    fn strings_compare_case_insensitively() {
        let order = OrderBy::parse("name").unwrap();
        let a = record! { "name" => "Ada" };
        let b = record! { "name" => "ada" };
        assert_eq!(order.compare_records(&a, &b), Ordering::Equal);

        let c = record! { "name" => "Grace" };
        assert_eq!(order.compare_records(&a, &c), Ordering::Less);
    }

    #[test]
    fn compound_ordering_is_lexicographic() {
        let order = OrderBy::parse_all(["group", "age-"]).unwrap();
        let a = record! { "group" => "x", "age" => 30 };
        let b = record! { "group" => "x", "age" => 40 };
        let c = record! { "group" => "y", "age" => 10 };

        assert_eq!(order.compare_records(&a, &b), Ordering::Greater);
        assert_eq!(order.compare_records(&b, &c), Ordering::Less);
    }

    #[test]
    fn missing_values_sort_first() {
        let order = OrderBy::parse("age").unwrap();
        let missing = record! { "name" => "x" };
        let present = record! { "age" => 1 };
        assert_eq!(order.compare_records(&missing, &present), Ordering::Less);
    }
}
