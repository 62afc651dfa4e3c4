//! Logical predicates and their translation into storage ranges.

use cellar_store::RowRange;

use crate::error::{ConnectorError, Result};
use crate::schema::ColumnType;
use crate::serializer::{RowSerializer, Value};

/// How a one-sided marker binds: `Exactly` includes the endpoint, `Above`
/// and `Below` exclude it from the low and high side respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exactly,
    Above,
    Below,
}

/// One contiguous span of logical values. `None` endpoints are unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRange {
    pub low: Option<Value>,
    pub low_bound: Bound,
    pub high: Option<Value>,
    pub high_bound: Bound,
}

impl LogicalRange {
    /// The unbounded range.
    pub fn all() -> Self {
        Self {
            low: None,
            low_bound: Bound::Above,
            high: None,
            high_bound: Bound::Below,
        }
    }

    /// Exactly one value.
    pub fn equal(value: Value) -> Self {
        Self {
            low: Some(value.clone()),
            low_bound: Bound::Exactly,
            high: Some(value),
            high_bound: Bound::Exactly,
        }
    }

    pub fn greater_than(value: Value) -> Self {
        Self {
            low: Some(value),
            low_bound: Bound::Above,
            high: None,
            high_bound: Bound::Below,
        }
    }

    pub fn at_least(value: Value) -> Self {
        Self {
            low: Some(value),
            low_bound: Bound::Exactly,
            high: None,
            high_bound: Bound::Below,
        }
    }

    pub fn less_than(value: Value) -> Self {
        Self {
            low: None,
            low_bound: Bound::Above,
            high: Some(value),
            high_bound: Bound::Below,
        }
    }

    pub fn at_most(value: Value) -> Self {
        Self {
            low: None,
            low_bound: Bound::Above,
            high: Some(value),
            high_bound: Bound::Exactly,
        }
    }

    pub fn between(low: Value, low_bound: Bound, high: Value, high_bound: Bound) -> Self {
        Self {
            low: Some(low),
            low_bound,
            high: Some(high),
            high_bound,
        }
    }

    pub fn is_all(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// The single value this range pins, when it pins one.
    pub fn single_value(&self) -> Option<&Value> {
        match (&self.low, &self.high) {
            (Some(low), Some(high))
                if low == high
                    && self.low_bound == Bound::Exactly
                    && self.high_bound == Bound::Exactly =>
            {
                Some(low)
            }
            _ => None,
        }
    }
}

/// Predicate over one column: a disjunction of logical ranges over one
/// type.
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub value_type: ColumnType,
    pub ranges: Vec<LogicalRange>,
}

impl Domain {
    pub fn new(value_type: ColumnType, ranges: Vec<LogicalRange>) -> Self {
        Self { value_type, ranges }
    }

    /// Domain holding exactly the listed values.
    pub fn of_values(value_type: ColumnType, values: Vec<Value>) -> Self {
        Self {
            value_type,
            ranges: values.into_iter().map(LogicalRange::equal).collect(),
        }
    }

    /// Translate every logical range into a storage row range through the
    /// table's serializer.
    pub fn storage_ranges(&self, serializer: &dyn RowSerializer) -> Result<Vec<RowRange>> {
        self.ranges
            .iter()
            .map(|range| storage_range(serializer, &self.value_type, range))
            .collect()
    }
}

fn storage_range(
    serializer: &dyn RowSerializer,
    value_type: &ColumnType,
    range: &LogicalRange,
) -> Result<RowRange> {
    if range.is_all() {
        return Ok(RowRange::all());
    }
    if let Some(value) = range.single_value() {
        return Ok(RowRange::exact(serializer.encode(value_type, value)?));
    }

    let start = range
        .low
        .as_ref()
        .map(|value| serializer.encode(value_type, value))
        .transpose()?;
    let end = range
        .high
        .as_ref()
        .map(|value| serializer.encode(value_type, value))
        .transpose()?;
    Ok(RowRange::new(
        start,
        range.low_bound == Bound::Exactly,
        end,
        range.high_bound == Bound::Exactly,
    ))
}

/// A column filter handed to the planner, with the schema-time indexed
/// flag and the column's own domain.
#[derive(Debug, Clone)]
pub struct ColumnConstraint {
    pub name: String,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub indexed: bool,
    pub domain: Option<Domain>,
}

impl ColumnConstraint {
    /// Domain of an indexed constraint; its absence is a planner
    /// precondition violation.
    pub(crate) fn require_domain(&self) -> Result<&Domain> {
        self.domain.as_ref().ok_or_else(|| {
            ConnectorError::Misconfiguration(format!(
                "indexed constraint on column '{}' carries no domain",
                self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::LexicoderSerializer;

    fn round_trip_endpoint(bytes: &[u8]) -> Value {
        LexicoderSerializer
            .decode(&ColumnType::Bigint, bytes)
            .unwrap()
    }

    #[test]
    fn unbounded_domain_translates_to_the_full_range() {
        let domain = Domain::new(ColumnType::Bigint, vec![LogicalRange::all()]);
        let ranges = domain.storage_ranges(&LexicoderSerializer).unwrap();
        assert_eq!(ranges, vec![RowRange::all()]);
    }

    #[test]
    fn single_values_become_point_ranges() {
        let domain = Domain::of_values(ColumnType::Bigint, vec![Value::Bigint(27)]);
        let ranges = domain.storage_ranges(&LexicoderSerializer).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].is_point());
        let start = ranges[0].start.clone().unwrap();
        assert_eq!(round_trip_endpoint(&start), Value::Bigint(27));
    }

    #[test]
    fn one_sided_ranges_keep_their_bound_kind() {
        let domain = Domain::new(
            ColumnType::Bigint,
            vec![
                LogicalRange::greater_than(Value::Bigint(10)),
                LogicalRange::at_most(Value::Bigint(20)),
            ],
        );
        let ranges = domain.storage_ranges(&LexicoderSerializer).unwrap();

        assert!(ranges[0].end.is_none());
        assert!(!ranges[0].start_inclusive);
        assert_eq!(
            round_trip_endpoint(ranges[0].start.as_ref().unwrap()),
            Value::Bigint(10)
        );

        assert!(ranges[1].start.is_none());
        assert!(ranges[1].end_inclusive);
        assert_eq!(
            round_trip_endpoint(ranges[1].end.as_ref().unwrap()),
            Value::Bigint(20)
        );
    }

    #[test]
    fn closed_ranges_encode_both_endpoints() {
        let domain = Domain::new(
            ColumnType::Bigint,
            vec![LogicalRange::between(
                Value::Bigint(5),
                Bound::Exactly,
                Value::Bigint(9),
                Bound::Below,
            )],
        );
        let ranges = domain.storage_ranges(&LexicoderSerializer).unwrap();
        let range = &ranges[0];
        assert!(range.start_inclusive);
        assert!(!range.end_inclusive);
        assert_eq!(
            round_trip_endpoint(range.start.as_ref().unwrap()),
            Value::Bigint(5)
        );
        assert_eq!(
            round_trip_endpoint(range.end.as_ref().unwrap()),
            Value::Bigint(9)
        );
    }

    #[test]
    fn encoded_range_order_matches_value_order() {
        let serializer = LexicoderSerializer;
        let low = serializer
            .encode(&ColumnType::Bigint, &Value::Bigint(-3))
            .unwrap();
        let high = serializer
            .encode(&ColumnType::Bigint, &Value::Bigint(4))
            .unwrap();
        let range = RowRange::new(Some(low), true, Some(high), true);
        let probe = serializer
            .encode(&ColumnType::Bigint, &Value::Bigint(0))
            .unwrap();
        assert!(range.contains(&probe));
    }
}
