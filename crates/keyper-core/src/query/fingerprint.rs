//! Canonical query fingerprints.
//!
//! A fingerprint is a deterministic string form of a criteria or parameter
//! set, used to address the query cache and the pending-request map.
//! Mapping-derived AND groups sort their children, so criteria built from
//! records with different key orders still collide on the same cache slot.
//! Operand lists (`$in`, `$or`) keep their order: it is semantically visible.

use super::Criteria;

use std::fmt::Write;

pub(super) fn write_criteria(criteria: &Criteria, out: &mut String) {
    match criteria {
        Criteria::Pass => out.push('*'),

        Criteria::And(children) => {
            let mut parts: Vec<String> = children
                .iter()
                .map(|child| {
                    let mut part = String::new();
                    write_criteria(child, &mut part);
                    part
                })
                .collect();
            parts.sort_unstable();

            out.push_str("$and:[");
            out.push_str(&parts.join(","));
            out.push(']');
        }
        Criteria::Or(children) => write_group("$or", children, out),
        Criteria::Nor(children) => write_group("$nor", children, out),
        Criteria::Not(child) => write_nested("$not", child, out),

        Criteria::Field(path, test) => {
            let _ = write!(out, "{path}:(");
            write_criteria(test, out);
            out.push(')');
        }

        Criteria::Cmp(op, operand) => {
            out.push_str(op.token());
            out.push(':');
            operand.write_fingerprint(out);
        }
        Criteria::In(operands) => write_values("$in", operands, out),
        Criteria::NotIn(operands) => write_values("$nin", operands, out),
        Criteria::Like(pattern) => {
            let _ = write!(out, "$like:{:?}", pattern.pattern());
        }

        Criteria::AnyElement(test) => write_nested("$any", test, out),
        Criteria::AllElements(test) => write_nested("$all", test, out),
        Criteria::Length(test) => write_nested("$length", test, out),
    }
}

fn write_group(token: &str, children: &[Criteria], out: &mut String) {
    out.push_str(token);
    out.push_str(":[");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_criteria(child, out);
    }
    out.push(']');
}

fn write_nested(token: &str, child: &Criteria, out: &mut String) {
    out.push_str(token);
    out.push_str(":(");
    write_criteria(child, out);
    out.push(')');
}

fn write_values(token: &str, values: &[crate::Value], out: &mut String) {
    out.push_str(token);
    out.push_str(":[");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        value.write_fingerprint(out);
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use crate::query::Criteria;
    use crate::record;

    #[test]
    fn field_order_does_not_change_the_fingerprint() {
        let a = Criteria::parse(
            &record! { "author_id" => 7, "text" => record! { "$like" => "a%" } }.into(),
        )
        .unwrap();
        let b = Criteria::parse(
            &record! { "text" => record! { "$like" => "a%" }, "author_id" => 7 }.into(),
        )
        .unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn different_operands_differ() {
        let a = Criteria::parse(&record! { "author_id" => 7 }.into()).unwrap();
        let b = Criteria::parse(&record! { "author_id" => 8 }.into()).unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
