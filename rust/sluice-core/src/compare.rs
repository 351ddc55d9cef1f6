//! Named comparison operators.
//!
//! Filters and guard conditions are configured with operator names rather
//! than code. `future` and `past` are aliases for `ge` and `le`, read as
//! "value compared to the reference".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NluError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Comparison {
    /// Evaluate `left <op> right`.
    pub fn holds<T: PartialOrd + ?Sized>(&self, left: &T, right: &T) -> bool {
        match self {
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Ge => left >= right,
            Comparison::Gt => left > right,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Lt => "lt",
            Comparison::Le => "le",
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Ge => "ge",
            Comparison::Gt => "gt",
        }
    }
}

impl FromStr for Comparison {
    type Err = NluError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "lt" => Ok(Comparison::Lt),
            "le" | "past" => Ok(Comparison::Le),
            "eq" => Ok(Comparison::Eq),
            "ne" => Ok(Comparison::Ne),
            "ge" | "future" => Ok(Comparison::Ge),
            "gt" => Ok(Comparison::Gt),
            other => Err(NluError::Configuration(format!(
                "unsupported comparison '{other}', expected one of future, past, lt, le, eq, ne, ge, gt"
            ))),
        }
    }
}

impl TryFrom<String> for Comparison {
    type Error = NluError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Comparison> for String {
    fn from(comparison: Comparison) -> Self {
        comparison.as_str().to_owned()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
