//! Statement parameters.
//!
//! Parameters are bound positionally and transmitted as text; the server
//! coerces them. NULL binds SQL NULL, as does a missing trailing argument.

use bytes::Bytes;

use crate::error::{Error, Result};

/// A statement parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL NULL.
    Null,
    /// A text or binary string, sent as is.
    Text(Bytes),
    /// An integer, sent as its decimal text.
    Int(i64),
    /// A float, sent as its shortest round-trip text.
    Float(f64),
    /// A boolean. There is no textual binding for booleans; rejected.
    Bool(bool),
}

impl Param {
    /// Wire form of the parameter, or `None` when it is not bindable.
    fn to_text(&self) -> Option<Option<Bytes>> {
        match self {
            Self::Null => Some(None),
            Self::Text(bytes) => Some(Some(bytes.clone())),
            Self::Int(v) => Some(Some(Bytes::from(v.to_string()))),
            Self::Float(v) => Some(Some(Bytes::from(v.to_string()))),
            Self::Bool(_) => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Text(_) => "string",
            Self::Int(_) => "integer",
            Self::Float(_) => "number",
            Self::Bool(_) => "boolean",
        }
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(Bytes::from(v))
    }
}

impl From<&[u8]> for Param {
    fn from(v: &[u8]) -> Self {
        Self::Text(Bytes::copy_from_slice(v))
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Self::Text(Bytes::from(v))
    }
}

impl From<Bytes> for Param {
    fn from(v: Bytes) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Convert parameters to their bound form for a statement with
/// `param_count` placeholders.
///
/// Missing trailing parameters bind NULL. Unbindable values and surplus
/// parameters are rejected with [`Error::Argument`] before any I/O.
pub fn bind_values(params: &[Param], param_count: usize) -> Result<Vec<Option<Bytes>>> {
    if params.len() > param_count {
        return Err(Error::Argument {
            position: param_count + 1,
            message: format!(
                "statement takes {param_count} parameter{}, got {}",
                if param_count == 1 { "" } else { "s" },
                params.len()
            ),
        });
    }

    let mut values = Vec::with_capacity(param_count);
    for (i, param) in params.iter().enumerate() {
        let value = param.to_text().ok_or_else(|| Error::Argument {
            position: i + 1,
            message: format!("expected nil or string, got {}", param.type_name()),
        })?;
        values.push(value);
    }
    values.resize(param_count, None);
    Ok(values)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_params_bind_null() {
        let values = bind_values(&["a".into()], 3).unwrap();
        assert_eq!(values, vec![Some(Bytes::from_static(b"a")), None, None]);
    }

    #[test]
    fn test_numbers_bind_as_text() {
        let values = bind_values(&[42i64.into(), 1.5f64.into(), Param::Null], 3).unwrap();
        assert_eq!(values[0].as_deref(), Some(&b"42"[..]));
        assert_eq!(values[1].as_deref(), Some(&b"1.5"[..]));
        assert_eq!(values[2], None);
    }

    #[test]
    fn test_bool_is_rejected() {
        let err = bind_values(&["a".into(), true.into()], 2).unwrap_err();
        assert_eq!(
            err,
            Error::Argument {
                position: 2,
                message: "expected nil or string, got boolean".into(),
            }
        );
    }

    #[test]
    fn test_surplus_params_rejected() {
        let err = bind_values(&["a".into(), "b".into()], 1).unwrap_err();
        assert!(matches!(err, Error::Argument { position: 2, .. }));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Param::from(None::<&str>), Param::Null);
        assert_eq!(Param::from(Some("x")), Param::Text(Bytes::from_static(b"x")));
    }
}
