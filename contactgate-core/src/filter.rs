//! Filter normalization.
//!
//! Callers describe predicates as a JSON object keyed by column. Each entry
//! may be written three ways, all producing the same canonical [`Filter`]:
//!
//! ```text
//! {"outcome": "FAILED"}                                  scalar, implies equals
//! {"date_modified": [">=", "2026-02-17"]}                [operator, value] pair
//! {"date_modified": {"op": ">=", "value": "2026-02-17"}} structured form
//! ```
//!
//! Unknown operators are rejected rather than treated as equals.

use crate::error::{ContactGateError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y", "%d-%b-%y"];
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// A value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Converts a JSON scalar. Arrays and objects have no scalar form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Converts a JSON scalar, turning date-like strings into typed values.
    pub fn from_json_temporal(value: &Value) -> Option<Self> {
        Self::from_json(value).map(Self::into_temporal)
    }

    /// Parses text that looks like a date or timestamp; other values pass
    /// through unchanged.
    #[must_use]
    pub fn into_temporal(self) -> Self {
        let Self::Text(text) = &self else {
            return self;
        };
        let trimmed = text.trim();
        for format in TIMESTAMP_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Self::Timestamp(ts);
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Self::Date(date);
            }
        }
        self
    }

    /// Borrowed text, when this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for SQL NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Parses numeric text into an integer or float; other values pass
    /// through. Returns `None` for text that is not a number.
    pub fn into_numeric(self) -> Option<Self> {
        let Self::Text(text) = &self else {
            return Some(self);
        };
        let trimmed = text.trim();
        trimmed
            .parse::<i64>()
            .map(Self::Int)
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Self::Float)
            })
    }
}

/// Predicate operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    ILike,
    NotILike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Parses an operator symbol or name, case-insensitively.
    pub fn parse(symbol: &str) -> Option<Self> {
        let op = match symbol.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "eq" => Self::Eq,
            "!=" | "<>" | "neq" | "ne" => Self::NotEq,
            ">" | "gt" => Self::Gt,
            ">=" | "gte" => Self::Gte,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" => Self::Lte,
            "like" => Self::Like,
            "not_like" | "not like" => Self::NotLike,
            "ilike" => Self::ILike,
            "not_ilike" | "not ilike" => Self::NotILike,
            "in" => Self::In,
            "not_in" | "not in" => Self::NotIn,
            "between" => Self::Between,
            "is_null" | "is null" => Self::IsNull,
            "is_not_null" | "is not null" => Self::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    /// SQL operator text for the binary comparison operators.
    pub const fn comparison_sql(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::NotEq => Some("<>"),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            _ => None,
        }
    }

    /// True for operators that take no value.
    pub const fn is_null_check(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// True for the `LIKE` family.
    pub const fn is_pattern(self) -> bool {
        matches!(
            self,
            Self::Like | Self::NotLike | Self::ILike | Self::NotILike
        )
    }
}

/// Operand of a filter, shaped by its operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null checks carry no operand
    None,
    /// Comparisons and pattern matches
    Single(SqlValue),
    /// Membership
    List(Vec<SqlValue>),
    /// Inclusive range
    Range(SqlValue, SqlValue),
}

impl FilterValue {
    /// All bound values, in binding order.
    pub fn values(&self) -> Vec<&SqlValue> {
        match self {
            Self::None => Vec::new(),
            Self::Single(v) => vec![v],
            Self::List(vs) => vs.iter().collect(),
            Self::Range(low, high) => vec![low, high],
        }
    }

    /// Applies `f` to every value, failing when `f` rejects any of them.
    pub fn try_map(self, mut f: impl FnMut(SqlValue) -> Option<SqlValue>) -> Option<Self> {
        Some(match self {
            Self::None => Self::None,
            Self::Single(v) => Self::Single(f(v)?),
            Self::List(vs) => Self::List(vs.into_iter().map(f).collect::<Option<_>>()?),
            Self::Range(low, high) => Self::Range(f(low)?, f(high)?),
        })
    }
}

/// A canonical predicate on one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    /// Lowercase logical column name
    pub column: String,
    /// Operator
    pub operator: Operator,
    /// Operand
    pub value: FilterValue,
}

impl Filter {
    /// Builds a filter directly from canonical parts.
    pub fn new(column: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// Normalizes an optional filter mapping into canonical filters.
///
/// Filters come back sorted by column so parameter order is deterministic.
///
/// # Errors
/// Returns `MalformedFilter` naming the offending column for an unknown
/// operator, a missing operand, or an operand of the wrong shape.
pub fn normalize_filters(filters: Option<&Map<String, Value>>) -> Result<Vec<Filter>> {
    let Some(filters) = filters else {
        return Ok(Vec::new());
    };
    let mut entries: Vec<(&String, &Value)> = filters.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .map(|(column, spec)| normalize_filter(column, spec))
        .collect()
}

/// Normalizes one `column -> spec` entry.
///
/// # Errors
/// See [`normalize_filters`].
pub fn normalize_filter(column: &str, spec: &Value) -> Result<Filter> {
    let column = column.trim().to_lowercase();
    if column.is_empty() {
        return Err(ContactGateError::malformed_filter(
            column,
            "column name cannot be empty",
        ));
    }

    match spec {
        Value::Array(items) => normalize_pair(column, items),
        Value::Object(fields) => normalize_structured(column, fields),
        scalar => build_filter(column, Operator::Eq, Some(scalar)),
    }
}

fn normalize_pair(column: String, items: &[Value]) -> Result<Filter> {
    let (symbol, rest) = match items.split_first() {
        Some((Value::String(symbol), rest)) => (symbol, rest),
        Some(_) => {
            return Err(ContactGateError::malformed_filter(
                column,
                "pair form must start with an operator string; use {\"op\": \"in\"} for lists",
            ));
        }
        None => {
            return Err(ContactGateError::malformed_filter(
                column,
                "empty filter pair",
            ));
        }
    };
    let operator = parse_operator(&column, symbol)?;
    match rest {
        [] => build_filter(column, operator, None),
        [value] => build_filter(column, operator, Some(value)),
        _ => Err(ContactGateError::malformed_filter(
            column,
            format!(
                "pair form takes exactly [operator, value], got {} elements",
                items.len()
            ),
        )),
    }
}

fn normalize_structured(column: String, fields: &Map<String, Value>) -> Result<Filter> {
    if let Some(unknown) = fields.keys().find(|k| *k != "op" && *k != "value") {
        return Err(ContactGateError::malformed_filter(
            column,
            format!("unexpected key '{unknown}' (expected 'op' and 'value')"),
        ));
    }
    let operator = match fields.get("op") {
        Some(Value::String(symbol)) => parse_operator(&column, symbol)?,
        Some(_) => {
            return Err(ContactGateError::malformed_filter(
                column,
                "'op' must be a string",
            ));
        }
        None => {
            return Err(ContactGateError::malformed_filter(
                column,
                "structured filter is missing 'op'",
            ));
        }
    };
    build_filter(column, operator, fields.get("value"))
}

fn parse_operator(column: &str, symbol: &str) -> Result<Operator> {
    Operator::parse(symbol).ok_or_else(|| {
        ContactGateError::malformed_filter(column, format!("unknown operator '{symbol}'"))
    })
}

fn build_filter(column: String, operator: Operator, operand: Option<&Value>) -> Result<Filter> {
    let value = match operator {
        Operator::IsNull | Operator::IsNotNull => match operand {
            None | Some(Value::Null) => FilterValue::None,
            Some(_) => {
                return Err(ContactGateError::malformed_filter(
                    column,
                    "null checks take no value",
                ));
            }
        },
        // `= null` and `!= null` mean null checks
        Operator::Eq | Operator::NotEq if matches!(operand, Some(Value::Null)) => {
            let operator = if operator == Operator::Eq {
                Operator::IsNull
            } else {
                Operator::IsNotNull
            };
            return Ok(Filter::new(column, operator, FilterValue::None));
        }
        Operator::Eq
        | Operator::NotEq
        | Operator::Gt
        | Operator::Gte
        | Operator::Lt
        | Operator::Lte => {
            let value = required_scalar(&column, operand)?;
            FilterValue::Single(value.into_temporal())
        }
        Operator::Like | Operator::NotLike | Operator::ILike | Operator::NotILike => {
            match required_scalar(&column, operand)? {
                text @ SqlValue::Text(_) => FilterValue::Single(text),
                _ => {
                    return Err(ContactGateError::malformed_filter(
                        column,
                        "pattern operators need a string pattern",
                    ));
                }
            }
        }
        Operator::In | Operator::NotIn => {
            let items = required_list(&column, operand)?;
            if items.is_empty() {
                return Err(ContactGateError::malformed_filter(
                    column,
                    "membership needs at least one value",
                ));
            }
            let values = items
                .iter()
                .map(|item| list_scalar(&column, item))
                .collect::<Result<Vec<_>>>()?;
            FilterValue::List(values)
        }
        Operator::Between => {
            let items = required_list(&column, operand)?;
            let [low, high] = items else {
                return Err(ContactGateError::malformed_filter(
                    column,
                    format!("range needs exactly two bounds, got {}", items.len()),
                ));
            };
            FilterValue::Range(list_scalar(&column, low)?, list_scalar(&column, high)?)
        }
    };
    Ok(Filter::new(column, operator, value))
}

fn required_scalar(column: &str, operand: Option<&Value>) -> Result<SqlValue> {
    let value = operand
        .ok_or_else(|| ContactGateError::malformed_filter(column, "missing value"))?;
    match SqlValue::from_json(value) {
        Some(SqlValue::Null) => Err(ContactGateError::malformed_filter(
            column,
            "value cannot be null for this operator",
        )),
        Some(scalar) => Ok(scalar),
        None => Err(ContactGateError::malformed_filter(
            column,
            "value must be a string, number or boolean",
        )),
    }
}

fn required_list<'a>(column: &str, operand: Option<&'a Value>) -> Result<&'a [Value]> {
    match operand {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ContactGateError::malformed_filter(
            column,
            "value must be a list for this operator",
        )),
        None => Err(ContactGateError::malformed_filter(column, "missing value")),
    }
}

fn list_scalar(column: &str, item: &Value) -> Result<SqlValue> {
    match SqlValue::from_json_temporal(item) {
        Some(SqlValue::Null) | None => Err(ContactGateError::malformed_filter(
            column,
            "list elements must be non-null scalars",
        )),
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn one(column: &str, spec: Value) -> Result<Filter> {
        normalize_filter(column, &spec)
    }

    fn date(y: i32, m: u32, d: u32) -> SqlValue {
        SqlValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_scalar_means_equals() {
        let filter = one("OUTCOME", json!("FAILED")).unwrap();
        assert_eq!(filter.column, "outcome");
        assert_eq!(filter.operator, Operator::Eq);
        assert_eq!(
            filter.value,
            FilterValue::Single(SqlValue::Text("FAILED".into()))
        );
    }

    #[test]
    fn test_pair_and_structured_dates_match() {
        let pair = one("date_modified", json!([">=", "2026-02-17"])).unwrap();
        let structured = one("date_modified", json!({"op": ">=", "value": "2026-02-17"})).unwrap();
        let named = one("date_modified", json!({"op": "GTE", "value": "2026-02-17"})).unwrap();

        assert_eq!(pair, structured);
        assert_eq!(pair, named);
        assert_eq!(pair.value, FilterValue::Single(date(2026, 2, 17)));
    }

    #[test]
    fn test_oracle_style_dates() {
        let filter = one("date_modified", json!(["<", "17-Feb-2026"])).unwrap();
        assert_eq!(filter.value, FilterValue::Single(date(2026, 2, 17)));

        let filter = one("date_modified", json!(["<", "2026-02-17 08:30:00"])).unwrap();
        assert!(matches!(
            filter.value,
            FilterValue::Single(SqlValue::Timestamp(_))
        ));
    }

    #[test]
    fn test_pattern_values_stay_text() {
        let filter = one("account", json!(["like", "2026-02-1%"])).unwrap();
        assert_eq!(
            filter.value,
            FilterValue::Single(SqlValue::Text("2026-02-1%".into()))
        );
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = one("outcome", json!(["~=", "FAILED"])).unwrap_err();
        assert!(matches!(err, ContactGateError::MalformedFilter { ref column, .. } if column == "outcome"));

        let err = one("outcome", json!({"op": "contains", "value": "F"})).unwrap_err();
        assert_eq!(err.kind(), "MalformedFilter");
    }

    #[test]
    fn test_missing_parts_rejected() {
        assert!(one("outcome", json!({"value": "FAILED"})).is_err());
        assert!(one("outcome", json!({"op": "="})).is_err());
        assert!(one("outcome", json!(["="])).is_err());
        assert!(one("outcome", json!([])).is_err());
        assert!(one("outcome", json!({"op": "=", "value": "A", "extra": 1})).is_err());
    }

    #[test]
    fn test_range_needs_two_bounds() {
        assert!(one("attempt", json!(["between", [1]])).is_err());
        assert!(one("attempt", json!(["between", [1, 2, 3]])).is_err());
        assert!(one("attempt", json!(["between", 1, 2])).is_err());

        let filter = one("attempt", json!(["between", [1, 3]])).unwrap();
        assert_eq!(
            filter.value,
            FilterValue::Range(SqlValue::Int(1), SqlValue::Int(3))
        );
    }

    #[test]
    fn test_membership() {
        let filter = one("skill_id", json!({"op": "in", "value": [10, 11]})).unwrap();
        assert_eq!(
            filter.value,
            FilterValue::List(vec![SqlValue::Int(10), SqlValue::Int(11)])
        );
        assert!(one("skill_id", json!(["in", []])).is_err());
        assert!(one("skill_id", json!(["in", 10])).is_err());
        assert!(one("skill_id", json!(["in", [10, null]])).is_err());
    }

    #[test]
    fn test_null_forms() {
        let expected = Filter::new("phone2", Operator::IsNull, FilterValue::None);
        assert_eq!(one("phone2", json!(null)).unwrap(), expected);
        assert_eq!(one("phone2", json!(["is_null"])).unwrap(), expected);
        assert_eq!(one("phone2", json!(["is_null", null])).unwrap(), expected);
        assert_eq!(one("phone2", json!({"op": "is_null"})).unwrap(), expected);
        assert_eq!(one("phone2", json!(["=", null])).unwrap(), expected);

        let not_null = one("phone2", json!(["!=", null])).unwrap();
        assert_eq!(not_null.operator, Operator::IsNotNull);
        assert!(one("phone2", json!(["is_null", "x"])).is_err());
        assert!(one("phone2", json!([">", null])).is_err());
    }

    #[test]
    fn test_nested_values_rejected() {
        assert!(one("outcome", json!(["=", {"a": 1}])).is_err());
        assert!(one("outcome", json!(["=", [1]])).is_err());
        assert!(one("outcome", json!([1, 2])).is_err());
    }

    #[test]
    fn test_filters_sorted_by_column() {
        let raw = json!({"outcome": "FAILED", "lvtransaction_type": "SMS", "attempt": [">", 1]});
        let filters = normalize_filters(raw.as_object()).unwrap();
        let columns: Vec<&str> = filters.iter().map(|f| f.column.as_str()).collect();
        assert_eq!(columns, vec!["attempt", "lvtransaction_type", "outcome"]);
        assert!(normalize_filters(None).unwrap().is_empty());
    }

    fn scalar_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[A-Za-z0-9 _%-]{0,16}".prop_map(Value::from),
            (2000i32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| Value::from(format!("{y:04}-{m:02}-{d:02}"))),
        ]
    }

    proptest! {
        #[test]
        fn prop_three_forms_are_equivalent(
            column in "[a-z][a-z0-9_]{0,20}",
            value in scalar_strategy(),
        ) {
            let scalar = normalize_filter(&column, &value).unwrap();
            let pair = normalize_filter(&column, &json!(["=", value.clone()])).unwrap();
            let structured =
                normalize_filter(&column, &json!({"op": "eq", "value": value})).unwrap();
            prop_assert_eq!(&scalar, &pair);
            prop_assert_eq!(&scalar, &structured);
        }

        #[test]
        fn prop_comparison_pair_matches_structured(
            op in prop::sample::select(vec![">", ">=", "<", "<=", "!=", "like"]),
            value in "[A-Za-z0-9%]{1,12}",
        ) {
            let pair = normalize_filter("outcome", &json!([op, value])).unwrap();
            let structured =
                normalize_filter("outcome", &json!({"op": op, "value": value})).unwrap();
            prop_assert_eq!(pair, structured);
        }
    }
}
