//! Translate `column__operator=value` request arguments into a parameterized
//! WHERE clause. Values are always bound; only quoted column names reach the
//! SQL text.

use crate::db::quote_identifier;
use crate::types::Params;
use std::collections::BTreeMap;

/// Comparison requested by a filter key suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Exact,
    Not,
    Contains,
    EndsWith,
    StartsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
    IsNotNull,
    In,
}

impl Operator {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let op = match suffix {
            "exact" => Operator::Exact,
            "not" => Operator::Not,
            "contains" => Operator::Contains,
            "endswith" => Operator::EndsWith,
            "startswith" => Operator::StartsWith,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "isnull" => Operator::IsNull,
            "isnotnull" => Operator::IsNotNull,
            "in" => Operator::In,
            _ => return None,
        };
        Some(op)
    }
}

/// One parsed filter argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub op: Operator,
    pub value: String,
}

impl Filter {
    /// Parse a `column` or `column__operator` key.
    ///
    /// A key whose suffix is not a known operator is an equality filter on the
    /// whole key, so columns with `__` in their names stay filterable.
    pub fn parse(key: &str, value: &str) -> Self {
        if let Some((column, suffix)) = key.rsplit_once("__") {
            if !column.is_empty() {
                if let Some(op) = Operator::from_suffix(suffix) {
                    return Self {
                        column: column.to_string(),
                        op,
                        value: value.to_string(),
                    };
                }
            }
        }
        Self {
            column: key.to_string(),
            op: Operator::Exact,
            value: value.to_string(),
        }
    }

    /// Append this filter's clause to `clauses`, binding any values into `params`
    fn push_clause(&self, clauses: &mut Vec<String>, params: &mut Params) {
        let column = quote_identifier(&self.column);
        let clause = match self.op {
            Operator::IsNull => format!("{} is null", column),
            Operator::IsNotNull => format!("{} is not null", column),
            Operator::In => {
                let placeholders = self
                    .value
                    .split(',')
                    .map(|item| format!(":{}", params.push_positional(item)))
                    .collect::<Vec<_>>();
                format!("{} in ({})", column, placeholders.join(", "))
            }
            op => {
                let (sql_op, value) = match op {
                    Operator::Not => ("!=", self.value.clone()),
                    Operator::Contains => ("like", format!("%{}%", self.value)),
                    Operator::EndsWith => ("like", format!("%{}", self.value)),
                    Operator::StartsWith => ("like", format!("{}%", self.value)),
                    Operator::Gt => (">", self.value.clone()),
                    Operator::Gte => (">=", self.value.clone()),
                    Operator::Lt => ("<", self.value.clone()),
                    Operator::Lte => ("<=", self.value.clone()),
                    _ => ("=", self.value.clone()),
                };
                let name = params.push_positional(value);
                format!("{} {} :{}", column, sql_op, name)
            }
        };
        clauses.push(clause);
    }
}

/// Reserved control arguments start with one underscore and contain no `__`
pub fn is_special_key(key: &str) -> bool {
    key.starts_with('_') && !key.contains("__")
}

/// WHERE clauses ready to be joined with `and`, plus their bound values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub clauses: Vec<String>,
    pub params: Params,
}

impl WhereClause {
    /// `where a and b ` or the empty string
    pub fn to_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("where {} ", self.clauses.join(" and "))
        }
    }
}

/// Build clauses from filter arguments, in key order
pub fn build_where(filters: &BTreeMap<String, String>) -> WhereClause {
    let mut clause = WhereClause::default();
    for (key, value) in filters {
        if is_special_key(key) {
            continue;
        }
        Filter::parse(key, value).push_clause(&mut clause.clauses, &mut clause.params);
    }
    clause
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn build(pairs: &[(&str, &str)]) -> WhereClause {
        let filters = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        build_where(&filters)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn operators_translate_to_sql() {
        let cases = [
            ("name", "\"name\" = :p0", "x"),
            ("name__exact", "\"name\" = :p0", "x"),
            ("name__not", "\"name\" != :p0", "x"),
            ("name__contains", "\"name\" like :p0", "%x%"),
            ("name__endswith", "\"name\" like :p0", "%x"),
            ("name__startswith", "\"name\" like :p0", "x%"),
            ("name__gt", "\"name\" > :p0", "x"),
            ("name__gte", "\"name\" >= :p0", "x"),
            ("name__lt", "\"name\" < :p0", "x"),
            ("name__lte", "\"name\" <= :p0", "x"),
        ];
        for (key, sql, bound) in cases {
            let built = build(&[(key, "x")]);
            assert_eq!(built.clauses, vec![sql.to_string()], "{key}");
            assert_eq!(built.params.get("p0"), Some(&text(bound)), "{key}");
        }
    }

    #[test]
    fn null_checks_bind_nothing() {
        let built = build(&[("a__isnull", "1"), ("b__isnotnull", "")]);
        assert_eq!(built.clauses, vec!["\"a\" is null", "\"b\" is not null"]);
        assert!(built.params.is_empty());
    }

    #[test]
    fn in_splits_on_commas() {
        let built = build(&[("id__in", "1,2,3")]);
        assert_eq!(built.clauses, vec!["\"id\" in (:p0, :p1, :p2)"]);
        assert_eq!(built.params.get("p2"), Some(&text("3")));
    }

    #[test]
    fn unknown_suffix_is_a_literal_column() {
        let built = build(&[("weird__column", "v")]);
        assert_eq!(built.clauses, vec!["\"weird__column\" = :p0"]);

        let leading = build(&[("__gt", "v")]);
        assert_eq!(leading.clauses, vec!["\"__gt\" = :p0"]);
    }

    #[test]
    fn special_keys_are_skipped() {
        assert!(is_special_key("_next"));
        assert!(is_special_key("_sql_time_limit_ms"));
        assert!(!is_special_key("_col__exact"));
        assert!(!is_special_key("col"));

        let built = build(&[("_next", "5"), ("_hidden__exact", "1")]);
        assert_eq!(built.clauses, vec!["\"_hidden\" = :p0"]);
    }

    #[test]
    fn values_never_reach_sql_text() {
        let built = build(&[("b", "'; drop table t; --"), ("a\"x", "1")]);
        assert_eq!(
            built.to_sql(),
            "where \"a\"\"x\" = :p0 and \"b\" = :p1 "
        );
        assert_eq!(built.params.get("p1"), Some(&text("'; drop table t; --")));
    }
}
