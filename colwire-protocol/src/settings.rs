use std::fmt::{Display, Formatter};
use std::time::Duration;

use colwire_error::ColwireResult;
use colwire_io::WireWrite;

/// The value of one query setting.
///
/// Integers, booleans and time spans travel as variable-length integers; floats and strings
/// travel as strings.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    UInt64(u64),
    /// Zigzag-encoded on the wire.
    Int64(i64),
    Bool(bool),
    Float(f64),
    String(String),
    /// Sent as whole seconds.
    Seconds(Duration),
    /// Sent as whole milliseconds.
    Milliseconds(Duration),
}

impl SettingValue {
    pub fn write_to<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        match self {
            Self::UInt64(v) => out.write_varint(*v),
            Self::Int64(v) => out.write_varint(((v << 1) ^ (v >> 63)) as u64),
            Self::Bool(v) => out.write_varint(u64::from(*v)),
            Self::Float(v) => out.write_string(&v.to_string()),
            Self::String(v) => out.write_string(v),
            Self::Seconds(d) => out.write_varint(d.as_secs()),
            Self::Milliseconds(d) => {
                out.write_varint(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
        }
    }
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{}", u8::from(*v)),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
            Self::Seconds(d) => write!(f, "{}", d.as_secs()),
            Self::Milliseconds(d) => write!(f, "{}", d.as_millis()),
        }
    }
}

impl From<u64> for SettingValue {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Query settings in the order they were set. Setting a name again replaces its value in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: Vec<(String, SettingValue)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn remove(&mut self, name: &str) -> Option<SettingValue> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Write every setting as a name and value, then the empty name that ends the list.
    pub fn write_to<W: WireWrite>(&self, out: &mut W) -> ColwireResult<()> {
        for (name, value) in &self.entries {
            out.write_string(name)?;
            value.write_to(out)?;
        }
        out.write_string("")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SettingValue::UInt64(300), &[0xac, 0x02])]
    #[case(SettingValue::Int64(-1), &[0x01])]
    #[case(SettingValue::Int64(1), &[0x02])]
    #[case(SettingValue::Bool(true), &[0x01])]
    #[case(SettingValue::Float(0.5), b"\x030.5")]
    #[case(SettingValue::String("lz4".into()), b"\x03lz4")]
    #[case(SettingValue::Seconds(Duration::from_millis(2500)), &[0x02])]
    #[case(SettingValue::Milliseconds(Duration::from_secs(1)), &[0xe8, 0x07])]
    fn values_by_kind(#[case] value: SettingValue, #[case] expected: &[u8]) {
        let mut out = Vec::new();
        value.write_to(&mut out).unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn settings_keep_order_and_end_with_empty_name() {
        let mut settings = Settings::new().with("max_threads", 4u64).with("readonly", true);
        settings.set("max_threads", 8u64);
        assert_eq!(settings.get("max_threads"), Some(&SettingValue::UInt64(8)));
        let mut out = Vec::new();
        settings.write_to(&mut out).unwrap();
        assert_eq!(out, b"\x0bmax_threads\x08\x08readonly\x01\x00");
    }
}
