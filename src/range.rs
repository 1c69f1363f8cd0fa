//! Input range descriptions.
//!
//! A range is either an explicit list of values or an inclusive
//! `{start, stop, step}` progression. Both materialize to an ordered
//! `Vec<Value>` before any measurement starts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Upper bound on the number of inputs a stepped range may expand to.
pub const MAX_RANGE_LEN: u64 = 1_000_000;

fn default_step() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeSpec {
    // Listed first: a derived struct visitor would also accept a 3-element sequence.
    List(Vec<Value>),
    Stepped {
        start: i64,
        stop: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
}

impl RangeSpec {
    pub fn materialize(&self) -> Result<Vec<Value>, ConfigError> {
        match self {
            RangeSpec::List(items) => {
                if items.is_empty() {
                    return Err(self.invalid("range is empty"));
                }
                Ok(items.clone())
            }
            RangeSpec::Stepped { start, stop, step } => {
                let (start, stop, step) = (*start, *stop, *step);
                if step == 0 {
                    return Err(self.invalid("step must be non-zero"));
                }
                if (stop > start && step < 0) || (stop < start && step > 0) {
                    return Err(self.invalid("step points away from stop"));
                }
                let len = (i128::from(stop) - i128::from(start)) / i128::from(step) + 1;
                if len > i128::from(MAX_RANGE_LEN) {
                    return Err(self.invalid(&format!(
                        "expands to {len} inputs, more than {MAX_RANGE_LEN}"
                    )));
                }

                let mut out = Vec::with_capacity(len as usize);
                let mut n = start;
                while (step > 0 && n <= stop) || (step < 0 && n >= stop) {
                    out.push(Value::from(n));
                    n = match n.checked_add(step) {
                        Some(next) => next,
                        None => break,
                    };
                }
                Ok(out)
            }
        }
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidRange {
            spec: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeSpec::Stepped { start, stop, step } if *step == 1 => write!(f, "{start}..{stop}"),
            RangeSpec::Stepped { start, stop, step } => write!(f, "{start}..{stop}:{step}"),
            RangeSpec::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl FromStr for RangeSpec {
    type Err = ConfigError;

    /// `"[...]"` is a JSON array, so items may themselves be collections.
    /// `"a..b"` and `"a..b:step"` are inclusive progressions. Anything else is
    /// a comma-separated list of scalars parsed as JSON, falling back to plain
    /// strings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| ConfigError::InvalidRange {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        if s.starts_with('[') {
            let items: Vec<Value> =
                serde_json::from_str(s).map_err(|e| invalid(&format!("not a JSON array: {e}")))?;
            return Ok(RangeSpec::List(items));
        }

        if let Some((start, rest)) = s.split_once("..") {
            let (stop, step) = match rest.split_once(':') {
                Some((stop, step)) => (stop, Some(step)),
                None => (rest, None),
            };
            let parse = |v: &str| {
                v.trim()
                    .parse::<i64>()
                    .map_err(|e| invalid(&format!("`{}`: {e}", v.trim())))
            };
            let step = match step {
                Some(step) => parse(step)?,
                None => 1,
            };
            return Ok(RangeSpec::Stepped {
                start: parse(start)?,
                stop: parse(stop.trim_start_matches('='))?,
                step,
            });
        }

        if s.is_empty() {
            return Err(invalid("range is empty"));
        }

        let mut items = Vec::new();
        for item in s.split(',').map(str::trim) {
            if item.contains(['[', ']', '{', '}']) {
                return Err(invalid("collection items need the JSON array form `[...]`"));
            }
            items.push(serde_json::from_str(item).unwrap_or_else(|_| Value::from(item)));
        }
        Ok(RangeSpec::List(items))
    }
}
