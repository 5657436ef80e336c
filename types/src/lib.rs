pub mod api;
pub mod grid;
pub mod pricing;

pub use grid::{Grid, GridShapeError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Serde helpers for `u128` amounts.
///
/// Amounts are denominated in the ledger's smallest pricing unit and can
/// exceed what a JSON number (f64) represents losslessly, so they cross the
/// wire as decimal strings.
pub mod amount {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>()
            .map_err(|_| de::Error::custom(format!("invalid amount: {raw}")))
    }

    /// Same encoding for a vector of amounts.
    pub mod vec {
        use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            values: &[u128],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&value.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<u128>, D::Error> {
            let raw = Vec::<String>::deserialize(deserializer)?;
            raw.into_iter()
                .map(|value| {
                    value
                        .parse::<u128>()
                        .map_err(|_| de::Error::custom(format!("invalid amount: {value}")))
                })
                .collect()
        }
    }
}

/// Opaque address-like identifier of a layer owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid color: {0} (expected #rrggbb)")]
pub struct ColorParseError(pub String);

/// RGB color, wire format `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color([u8; 3]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let hex = raw
            .strip_prefix('#')
            .ok_or_else(|| ColorParseError(raw.to_string()))?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorParseError(raw.to_string()));
        }
        let parse = |range| u8::from_str_radix(&hex[range], 16);
        let (r, g, b) = (
            parse(0..2).map_err(|_| ColorParseError(raw.to_string()))?,
            parse(2..4).map_err(|_| ColorParseError(raw.to_string()))?,
            parse(4..6).map_err(|_| ColorParseError(raw.to_string()))?,
        );
        Ok(Self([r, g, b]))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// One purchased ownership record on a cell. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub owner: Address,
    pub color: Color,
}

/// One grid position: an immutable base value plus an append-only layer
/// history. The layer count is the cell's "generation" and drives pricing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(with = "amount")]
    pub base_value: u128,
    pub layers: Vec<Layer>,
}

impl Cell {
    pub fn new(base_value: u128) -> Self {
        Self {
            base_value,
            layers: Vec::new(),
        }
    }

    pub fn generation(&self) -> usize {
        self.layers.len()
    }

    /// Displayed color: the last layer's, or none while the cell is bare.
    pub fn current_color(&self) -> Option<&Color> {
        self.layers.last().map(|layer| &layer.color)
    }
}

/// One independently-enabled grid segment. `cells` is absent until the
/// stage has been enabled and bootstrapped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub enabled: bool,
    pub cells: Option<Grid>,
}

impl Stage {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            cells: None,
        }
    }

    pub fn enabled(cells: Grid) -> Self {
        Self {
            enabled: true,
            cells: Some(cells),
        }
    }
}

/// Weak coordinates into the replica, resolved by lookup at use time so a
/// selection stays valid across replica mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub stage: usize,
    pub row: usize,
    pub col: usize,
}

/// Point-in-time copy of the replica handed to presentation consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stages: Vec<Stage>,
    #[serde(with = "amount::vec")]
    pub total_values: Vec<u128>,
}
