//! Per-operation timeouts.
//!
//! Each resource instance may override its timeouts with a `timeouts` block of
//! Go-style duration strings (`"45m"`, `"30s"`, `"1h30m"`).

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ControlError, Result};
use crate::schema::{Attribute, Block, Nesting};

/// Default timeout for most operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default timeout for appliance activation.
pub const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(45 * 60);

/// The operations a resource performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create.
    Create,
    /// Read (refresh or import).
    Read,
    /// Update in place.
    Update,
    /// Delete.
    Delete,
}

impl Operation {
    /// The key inside the `timeouts` block.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeouts of one resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Create timeout.
    pub create: Duration,
    /// Read timeout.
    pub read: Duration,
    /// Update timeout.
    pub update: Duration,
    /// Delete timeout.
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl Timeouts {
    /// The same timeout for every operation.
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    /// Timeouts from the `timeouts` attribute of `attrs`, falling back to
    /// `default` for unset operations.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unparsable durations.
    pub fn from_attrs(attrs: &Map<String, Value>, default: Duration) -> Result<Self> {
        let mut timeouts = Self::uniform(default);
        let Some(Value::Object(block)) = attrs.get("timeouts") else {
            return Ok(timeouts);
        };

        for op in [Operation::Create, Operation::Read, Operation::Update, Operation::Delete] {
            if let Some(raw) = block.get(op.as_str()).and_then(Value::as_str) {
                let parsed = parse_duration(raw).map_err(|e| {
                    ControlError::invalid(
                        appgate_sdp_core::AttributePath::root("timeouts").attr(op.as_str()),
                        e.to_string(),
                    )
                })?;
                *timeouts.slot(op) = parsed;
            }
        }
        Ok(timeouts)
    }

    fn slot(&mut self, op: Operation) -> &mut Duration {
        match op {
            Operation::Create => &mut self.create,
            Operation::Read => &mut self.read,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }

    /// The timeout of `op`.
    #[must_use]
    pub const fn get(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// The `timeouts` block attached to every resource.
#[must_use]
pub fn timeouts_block() -> Block {
    let duration = || Attribute::string().describe("Go-style duration such as 10m");
    Block::new().attr(
        "timeouts",
        Attribute::block(
            Nesting::Single,
            Block::new()
                .attr("create", duration())
                .attr("read", duration())
                .attr("update", duration())
                .attr("delete", duration()),
        )
        .local(),
    )
}

/// Parse a Go-style duration: a sequence of `<number><unit>` with units
/// `h`, `m`, `s` and `ms`.
///
/// # Errors
///
/// Returns a validation error for empty input, unknown units or missing numbers.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ControlError::validation("empty duration"));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| ControlError::validation(format!("missing unit in duration {input:?}")))?;
        if digits == 0 {
            return Err(ControlError::validation(format!("invalid duration {input:?}")));
        }
        let value: f64 = rest[..digits]
            .parse()
            .map_err(|_| ControlError::validation(format!("invalid duration {input:?}")))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let seconds = match &rest[..unit_len] {
            "h" => value * 3600.0,
            "m" => value * 60.0,
            "s" => value,
            "ms" => value / 1000.0,
            other => {
                return Err(ControlError::validation(format!(
                    "unknown unit {other:?} in duration {input:?}"
                )))
            }
        };
        total += Duration::from_secs_f64(seconds);
        rest = &rest[unit_len..];
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_go_durations() {
        assert_eq!(parse_duration("45m").unwrap(), Duration::from_secs(2700));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn block_overrides_default() {
        let attrs = json!({"timeouts": {"create": "5m"}});
        let t = Timeouts::from_attrs(attrs.as_object().unwrap(), DEFAULT_TIMEOUT).unwrap();
        assert_eq!(t.get(Operation::Create), Duration::from_secs(300));
        assert_eq!(t.get(Operation::Delete), DEFAULT_TIMEOUT);
    }

    #[test]
    fn invalid_override_names_path() {
        let attrs = json!({"timeouts": {"update": "soon"}});
        let err = Timeouts::from_attrs(attrs.as_object().unwrap(), DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, ControlError::Validation { path: Some(ref p), .. } if p.to_string() == "timeouts.update"));
    }
}
