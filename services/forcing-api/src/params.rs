//! Lenient request field parsing.
//!
//! Map clients send integers either as JSON numbers or as numeric
//! strings, and dates either as strings or as bare numbers like
//! `20240601`. An empty string counts as absent.

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Int(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn loose<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Loose>, D::Error> {
    let value = Option::<Loose>::deserialize(deserializer)?;
    Ok(match value {
        Some(Loose::Text(s)) if s.trim().is_empty() => None,
        other => other,
    })
}

fn to_u64<E: de::Error>(value: Loose) -> Result<u64, E> {
    match value {
        Loose::Int(n) => Ok(n),
        Loose::Float(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
        Loose::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| E::custom(format!("expected a non-negative integer, got {:?}", s))),
        Loose::Float(f) => Err(E::custom(format!("expected a non-negative integer, got {}", f))),
        Loose::Bool(b) => Err(E::custom(format!("expected a non-negative integer, got {}", b))),
    }
}

/// Optional `u32` from a number or numeric string.
pub fn opt_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    loose(deserializer)?
        .map(|v| {
            to_u64(v).and_then(|n| {
                u32::try_from(n).map_err(|_| de::Error::custom(format!("{} is out of range", n)))
            })
        })
        .transpose()
}

/// Optional `usize` from a number or numeric string.
pub fn opt_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    loose(deserializer)?
        .map(|v| {
            to_u64(v).and_then(|n| {
                usize::try_from(n).map_err(|_| de::Error::custom(format!("{} is out of range", n)))
            })
        })
        .transpose()
}

/// Optional string; numbers are rendered as their decimal text.
pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(loose(deserializer)?.map(|v| match v {
        Loose::Int(n) => n.to_string(),
        Loose::Float(f) => f.to_string(),
        Loose::Bool(b) => b.to_string(),
        Loose::Text(s) => s.trim().to_string(),
    }))
}

/// Optional bool from `true`/`false`, `"true"`/`"false"` or `1`/`0`.
pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    loose(deserializer)?
        .map(|v| match v {
            Loose::Bool(b) => Ok(b),
            Loose::Int(0) => Ok(false),
            Loose::Int(1) => Ok(true),
            Loose::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(de::Error::custom(format!("expected a boolean, got {:?}", s))),
            },
            _ => Err(de::Error::custom("expected a boolean")),
        })
        .transpose()
}

/// Optional list of `u32`, each a number or numeric string.
pub fn opt_u32_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u32>>, D::Error> {
    let values = Option::<Vec<Loose>>::deserialize(deserializer)?;
    values
        .map(|list| {
            list.into_iter()
                .map(|v| {
                    to_u64(v).and_then(|n| {
                        u32::try_from(n)
                            .map_err(|_| de::Error::custom(format!("{} is out of range", n)))
                    })
                })
                .collect()
        })
        .transpose()
}
