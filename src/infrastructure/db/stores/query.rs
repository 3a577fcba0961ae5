use std::cmp::Ordering;

use regex::Regex;

use crate::infrastructure::db::stores::record_store::{Fields, RecordStoreError};

/// Comparison applied to one field of a record.
///
/// Numeric operators read missing or non-numeric values as `0`, so an unset
/// timestamp written as `"0"` or `""` compares as the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    NumEquals,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    Contains,
    Matches,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Operator, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.to_string(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl ToString) -> Self {
        Self::new(field, Operator::Equals, value)
    }

    /// Evaluate against a record. Fails only on an invalid regex.
    pub fn matches(&self, fields: &Fields) -> Result<bool, RecordStoreError> {
        let actual = fields.get(&self.field).map(String::as_str).unwrap_or("");

        let result = match self.op {
            Operator::Equals => actual == self.value,
            Operator::NotEquals => actual != self.value,
            Operator::NumEquals => numeric(actual) == numeric(&self.value),
            Operator::NumLt => numeric(actual) < numeric(&self.value),
            Operator::NumLe => numeric(actual) <= numeric(&self.value),
            Operator::NumGt => numeric(actual) > numeric(&self.value),
            Operator::NumGe => numeric(actual) >= numeric(&self.value),
            Operator::Contains => actual.contains(self.value.as_str()),
            Operator::Matches => Regex::new(&self.value)
                .map_err(|e| RecordStoreError::InvalidQuery(e.to_string()))?
                .is_match(actual),
        };

        Ok(result)
    }
}

/// Evaluate every predicate (logical AND).
pub fn matches_all(predicates: &[Predicate], fields: &Fields) -> Result<bool, RecordStoreError> {
    for predicate in predicates {
        if !predicate.matches(fields)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    StrAsc,
    StrDesc,
    NumAsc,
    NumDesc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: SortDirection,
}

impl Order {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn compare(&self, a: &Fields, b: &Fields) -> Ordering {
        let left = a.get(&self.field).map(String::as_str).unwrap_or("");
        let right = b.get(&self.field).map(String::as_str).unwrap_or("");

        match self.direction {
            SortDirection::StrAsc => left.cmp(right),
            SortDirection::StrDesc => right.cmp(left),
            SortDirection::NumAsc => numeric(left).total_cmp(&numeric(right)),
            SortDirection::NumDesc => numeric(right).total_cmp(&numeric(left)),
        }
    }
}

/// A predicate scan with optional ordering and paging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order = Some(Order::new(field, direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Numeric reading of a field value. Anything that is not a finite number reads as 0.
fn numeric(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// The numeric reading of `value` as decimal text, for stores comparing in SQL.
pub fn numeric_value(value: &str) -> String {
    numeric(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn given_numeric_predicates_when_matched_should_compare_as_numbers() {
        let fields = record(&[("run_at", "100"), ("priority", "-3")]);

        assert!(Predicate::new("run_at", Operator::NumLe, 100).matches(&fields).unwrap());
        assert!(!Predicate::new("run_at", Operator::NumLt, 100).matches(&fields).unwrap());
        assert!(Predicate::new("run_at", Operator::NumGt, 99).matches(&fields).unwrap());
        assert!(Predicate::new("priority", Operator::NumGe, -3).matches(&fields).unwrap());
        // "9" > "100" as text but not as a number.
        assert!(!Predicate::new("run_at", Operator::NumLt, "9").matches(&fields).unwrap());
    }

    #[test]
    fn given_missing_field_when_numeric_equals_zero_should_match() {
        let fields = record(&[("failed_at", "")]);
        assert!(Predicate::new("failed_at", Operator::NumEquals, 0).matches(&fields).unwrap());
        assert!(Predicate::new("locked_at", Operator::NumEquals, 0).matches(&fields).unwrap());
    }

    #[test]
    fn given_non_numeric_value_when_numeric_predicate_should_read_it_as_zero() {
        let fields = record(&[("failed_at", "garbage"), ("run_at", "inf")]);

        assert!(Predicate::new("failed_at", Operator::NumEquals, 0).matches(&fields).unwrap());
        assert!(Predicate::new("run_at", Operator::NumEquals, 0).matches(&fields).unwrap());
        assert!(!Predicate::new("failed_at", Operator::NumGt, "nope").matches(&fields).unwrap());
        assert_eq!(numeric_value("garbage"), "0");
        assert_eq!(numeric_value(" 1700000000 "), "1700000000");
        assert_eq!(numeric_value("-2.5"), "-2.5");
    }

    #[test]
    fn given_text_predicates_when_matched_should_compare_strings() {
        let fields = record(&[("locked_by", "host:a pid:1")]);

        assert!(Predicate::equals("locked_by", "host:a pid:1").matches(&fields).unwrap());
        assert!(Predicate::new("locked_by", Operator::NotEquals, "x").matches(&fields).unwrap());
        assert!(Predicate::new("locked_by", Operator::Contains, "pid:").matches(&fields).unwrap());
        assert!(Predicate::new("locked_by", Operator::Matches, r"^host:\w+ pid:\d+$")
            .matches(&fields)
            .unwrap());
    }

    #[test]
    fn given_invalid_regex_when_matched_should_return_invalid_query() {
        let fields = record(&[]);
        let result = Predicate::new("handler", Operator::Matches, "(").matches(&fields);
        assert!(matches!(result, Err(RecordStoreError::InvalidQuery(_))));
    }

    #[test]
    fn given_numeric_desc_order_when_compared_should_put_larger_first() {
        let order = Order::new("priority", SortDirection::NumDesc);
        let high = record(&[("priority", "10")]);
        let low = record(&[("priority", "9")]);
        assert_eq!(order.compare(&high, &low), Ordering::Less);
    }
}
