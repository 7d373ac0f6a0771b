use std::{collections::BTreeMap, str::FromStr};

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

/// Exact decimal `digits × 10^-scale`.
pub fn decimal(digits: i64, scale: i64) -> BigDecimal {
    BigDecimal::new(digits.into(), scale)
}

/// Shortest decimal that reads back as the same `f64`, `None` for NaN and infinities.
pub fn from_f64(value: f64) -> Option<BigDecimal> {
    if value.is_finite() { BigDecimal::from_str(&value.to_string()).ok() } else { None }
}

pub fn to_f64(value: &BigDecimal) -> Option<f64> {
    value.to_f64().filter(|value| value.is_finite())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
    let value = f64::deserialize(deserializer)?;
    from_f64(value).ok_or_else(|| D::Error::custom(format!("{value} is not a finite number")))
}

pub fn deserialize_option<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BigDecimal>, D::Error> {
    Option::<f64>::deserialize(deserializer)?
        .map(|value| {
            from_f64(value)
                .ok_or_else(|| D::Error::custom(format!("{value} is not a finite number")))
        })
        .transpose()
}

pub fn deserialize_map<'de, D, K>(deserializer: D) -> Result<BTreeMap<K, BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
    K: Deserialize<'de> + Ord,
{
    BTreeMap::<K, f64>::deserialize(deserializer)?
        .into_iter()
        .map(|(key, value)| {
            from_f64(value)
                .map(|value| (key, value))
                .ok_or_else(|| D::Error::custom(format!("{value} is not a finite number")))
        })
        .collect()
}

pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Money, rounded to cents.
pub fn serialize_cents<S: Serializer>(
    value: &BigDecimal,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format!("{:.2}", value.round(2)))
}

/// Per-unit rate, rounded to four decimals.
pub fn serialize_rate<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format!("{:.4}", value.round(4)))
}
