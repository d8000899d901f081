use alloc::borrow::Cow;
use alloc::string::String;

use serde_json::{Map, Value};

use uuid::Uuid;

/// The key of the unique identifier of a peripheral or a task.
pub const UUID_KEY: &str = "uuid";
/// The key of the type name of a peripheral or a task.
pub const TYPE_KEY: &str = "type";

/// The reason a parameter could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterErrorKind {
    /// A required property is absent or has the wrong type.
    Missing,
    /// An optional property is present but has the wrong type.
    WrongOptionalType,
    /// A property has the right type but an unacceptable value.
    InvalidValue,
    /// The parameters are not a JSON object.
    NotAnObject,
}

/// An error raised while reading a parameter object.
///
/// Its [`Display`](core::fmt::Display) output is the message reported to the
/// server, for example `Missing property: pin (unsigned int)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterError {
    kind: ParameterErrorKind,
    key: Cow<'static, str>,
    expected: &'static str,
}

impl ParameterError {
    /// Creates a [`ParameterError`].
    #[must_use]
    pub fn new(
        kind: ParameterErrorKind,
        key: impl Into<Cow<'static, str>>,
        expected: &'static str,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            expected,
        }
    }

    /// Creates a [`ParameterError`] for a missing required property.
    #[must_use]
    pub fn missing(key: impl Into<Cow<'static, str>>, expected: &'static str) -> Self {
        Self::new(ParameterErrorKind::Missing, key, expected)
    }

    /// Creates a [`ParameterError`] for a property with an unacceptable
    /// value.
    #[must_use]
    pub fn invalid(key: impl Into<Cow<'static, str>>, expected: &'static str) -> Self {
        Self::new(ParameterErrorKind::InvalidValue, key, expected)
    }

    /// Returns the [`ParameterErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ParameterErrorKind {
        self.kind
    }

    /// Returns the key of the faulty property.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl core::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind {
            ParameterErrorKind::Missing => {
                write!(f, "Missing property: {} ({})", self.key, self.expected)
            }
            ParameterErrorKind::WrongOptionalType => write!(
                f,
                "Wrong type for optional property: {} ({})",
                self.key, self.expected
            ),
            ParameterErrorKind::InvalidValue => {
                write!(f, "Invalid value for property: {} ({})", self.key, self.expected)
            }
            ParameterErrorKind::NotAnObject => write!(f, "Parameters must be an object"),
        }
    }
}

impl core::error::Error for ParameterError {}

/// A read-only view over a declarative parameter object.
///
/// Every accessor either returns a value of the requested type or a
/// [`ParameterError`] naming the key and the expected type.
#[derive(Debug, Clone, Copy)]
pub struct Parameters<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Parameters<'a> {
    /// Creates [`Parameters`] from a JSON object.
    #[must_use]
    pub const fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    /// Creates [`Parameters`] from any JSON value.
    ///
    /// # Errors
    ///
    /// An error is returned when the value is not a JSON object.
    pub fn from_value(value: &'a Value) -> Result<Self, ParameterError> {
        value.as_object().map(Self::new).ok_or(ParameterError::new(
            ParameterErrorKind::NotAnObject,
            "",
            "object",
        ))
    }

    /// Returns the raw value associated with a key.
    #[must_use]
    #[inline]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    /// Returns whether a non-null value is associated with a key.
    #[must_use]
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns the identifier stored under [`UUID_KEY`].
    ///
    /// # Errors
    ///
    /// An error is returned when the identifier is absent or malformed.
    #[inline]
    pub fn id(&self) -> Result<Uuid, ParameterError> {
        self.uuid(UUID_KEY)
    }

    /// Returns the type name stored under [`TYPE_KEY`].
    ///
    /// # Errors
    ///
    /// An error is returned when the type name is absent or not a string.
    #[inline]
    pub fn type_name(&self) -> Result<&'a str, ParameterError> {
        self.str(TYPE_KEY)
    }

    /// Returns a string.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or not a string.
    pub fn str(&self, key: &'static str) -> Result<&'a str, ParameterError> {
        self.get(key)
            .and_then(Value::as_str)
            .ok_or(ParameterError::missing(key, "string"))
    }

    /// Returns a UUID.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent, not a string, or
    /// not a well-formed UUID.
    pub fn uuid(&self, key: &'static str) -> Result<Uuid, ParameterError> {
        self.get(key)
            .and_then(Value::as_str)
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(ParameterError::missing(key, "uuid"))
    }

    /// Returns an unsigned integer.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or not an unsigned
    /// integer.
    pub fn u64(&self, key: &'static str) -> Result<u64, ParameterError> {
        self.get(key)
            .and_then(Value::as_u64)
            .ok_or(ParameterError::missing(key, "unsigned int"))
    }

    /// Returns a byte-sized unsigned integer.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or does not fit in a
    /// byte.
    pub fn u8(&self, key: &'static str) -> Result<u8, ParameterError> {
        self.get(key)
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
            .ok_or(ParameterError::missing(key, "uint8_t"))
    }

    /// Returns a pin number.
    ///
    /// Floating point values are rounded to the nearest integer. Pins must
    /// lie in the `[0, 255]` range.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent, not a number, or
    /// out of range.
    pub fn pin(&self, key: &'static str) -> Result<u8, ParameterError> {
        let value = self
            .get(key)
            .and_then(Value::as_f64)
            .ok_or(ParameterError::missing(key, "unsigned int"))?;
        let rounded = libm::round(value);
        if (0.0..=255.0).contains(&rounded) {
            Ok(rounded as u8)
        } else {
            Err(ParameterError::invalid(key, "pin 0-255"))
        }
    }

    /// Returns a floating point number.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or not a number.
    pub fn f32(&self, key: &'static str) -> Result<f32, ParameterError> {
        self.get(key)
            .and_then(Value::as_f64)
            .map(|value| value as f32)
            .ok_or(ParameterError::missing(key, "float"))
    }

    /// Returns a boolean.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or not a boolean.
    pub fn bool(&self, key: &'static str) -> Result<bool, ParameterError> {
        self.get(key)
            .and_then(Value::as_bool)
            .ok_or(ParameterError::missing(key, "bool"))
    }

    /// Returns a nested parameter object.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is absent or not an object.
    pub fn object(&self, key: &'static str) -> Result<Parameters<'a>, ParameterError> {
        self.get(key)
            .and_then(Value::as_object)
            .map(Parameters::new)
            .ok_or(ParameterError::missing(key, "object"))
    }

    /// Returns an optional unsigned integer.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but is not an
    /// unsigned integer.
    pub fn optional_u64(&self, key: &'static str) -> Result<Option<u64>, ParameterError> {
        self.optional(key, "unsigned int", Value::as_u64)
    }

    /// Returns an optional floating point number.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but is not a
    /// number.
    pub fn optional_f32(&self, key: &'static str) -> Result<Option<f32>, ParameterError> {
        self.optional(key, "float", |value| value.as_f64().map(|value| value as f32))
    }

    /// Returns an optional boolean.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but is not a
    /// boolean.
    pub fn optional_bool(&self, key: &'static str) -> Result<Option<bool>, ParameterError> {
        self.optional(key, "bool", Value::as_bool)
    }

    /// Returns an optional string.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but is not a
    /// string.
    pub fn optional_str(&self, key: &'static str) -> Result<Option<&'a str>, ParameterError> {
        self.optional(key, "string", Value::as_str)
    }

    /// Returns an optional UUID.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but is not a
    /// well-formed UUID.
    pub fn optional_uuid(&self, key: &'static str) -> Result<Option<Uuid>, ParameterError> {
        self.optional(key, "uuid", |value| {
            value.as_str().and_then(|value| Uuid::parse_str(value).ok())
        })
    }

    /// Returns an optional byte-sized unsigned integer.
    ///
    /// # Errors
    ///
    /// An error is returned when the property is present but does not fit
    /// in a byte.
    pub fn optional_u8(&self, key: &'static str) -> Result<Option<u8>, ParameterError> {
        self.optional(key, "uint8_t", |value| {
            value.as_u64().and_then(|value| u8::try_from(value).ok())
        })
    }

    fn optional<T>(
        &self,
        key: &'static str,
        expected: &'static str,
        convert: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<Option<T>, ParameterError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => convert(value).map(Some).ok_or(ParameterError::new(
                ParameterErrorKind::WrongOptionalType,
                key,
                expected,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use serde_json::json;

    use super::{ParameterErrorKind, Parameters};

    #[test]
    fn required_properties() {
        let value = json!({
            "uuid": "7b0b4a64-5c0d-4c0c-9b7e-8fb3c5c1f1a2",
            "type": "DigitalOut",
            "pin": 4.6,
            "label": 3,
        });
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(
            parameters.id().unwrap().to_string(),
            "7b0b4a64-5c0d-4c0c-9b7e-8fb3c5c1f1a2"
        );
        assert_eq!(parameters.type_name(), Ok("DigitalOut"));
        assert_eq!(parameters.pin("pin"), Ok(5));
        assert_eq!(
            parameters.str("label").unwrap_err().to_string(),
            "Missing property: label (string)"
        );
        assert_eq!(
            parameters.uuid("peripheral").unwrap_err().to_string(),
            "Missing property: peripheral (uuid)"
        );
    }

    #[test]
    fn pins_out_of_range() {
        let value = json!({
            "low": -3,
            "high": 255.4,
            "over": 256,
            "half": 2.5,
            "negative_half": -0.5,
            "huge": 1.0e300,
        });
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(
            parameters.pin("low").unwrap_err().kind(),
            ParameterErrorKind::InvalidValue
        );
        assert_eq!(parameters.pin("high"), Ok(255));
        assert!(parameters.pin("over").is_err());
        // Halves round away from zero.
        assert_eq!(parameters.pin("half"), Ok(3));
        assert!(parameters.pin("negative_half").is_err());
        assert_eq!(
            parameters.pin("huge").unwrap_err().kind(),
            ParameterErrorKind::InvalidValue
        );
    }

    #[test]
    fn optional_properties() {
        let value = json!({ "duration_ms": "soon", "interval_ms": 100, "active_low": null });
        let parameters = Parameters::from_value(&value).unwrap();

        assert_eq!(parameters.optional_u64("interval_ms"), Ok(Some(100)));
        assert_eq!(parameters.optional_bool("active_low"), Ok(None));
        assert_eq!(parameters.optional_bool("initial_state"), Ok(None));
        assert_eq!(
            parameters.optional_u64("duration_ms").unwrap_err().to_string(),
            "Wrong type for optional property: duration_ms (unsigned int)"
        );
    }

    #[test]
    fn not_an_object() {
        let value = json!([1, 2, 3]);
        assert_eq!(
            Parameters::from_value(&value).unwrap_err().kind(),
            ParameterErrorKind::NotAnObject
        );
    }
}
