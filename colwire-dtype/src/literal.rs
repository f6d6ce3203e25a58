use colwire_error::{ColwireResult, colwire_bail};

use crate::{DataType, DecimalValue, Number, TypeLexer, U256, Value};

impl DataType {
    /// Parse a SQL literal of this type from the cursor, e.g. `'2000-01-01'`, `[1, 2, 3]` or
    /// `{'a': 1}`, leaving the cursor just past the literal.
    pub fn parse_literal(&self, lexer: &mut TypeLexer<'_>) -> ColwireResult<Value> {
        lexer.skip_whitespace();
        let start = lexer.pos();
        if lexer.is_word_ahead() {
            let word = lexer.bare_word()?.to_ascii_lowercase();
            match word.as_str() {
                "null" if self.is_nullable() => return Ok(Value::Null),
                "null" => colwire_bail!(DataType: "NULL is not allowed for {}", self),
                "true" | "false" if matches!(self.unwrap_literal_type(), DataType::UInt8) => {
                    return Ok(Value::UInt8(u8::from(word == "true")));
                }
                "nan" | "inf"
                    if matches!(
                        self.unwrap_literal_type(),
                        DataType::Float32 | DataType::Float64
                    ) =>
                {
                    return self.coerce(Value::String(word.clone()));
                }
                _ => lexer.reset(start),
            }
        }

        match self.unwrap_literal_type() {
            DataType::Array(element) => {
                let values = Self::parse_list(lexer, '[', ']', |lexer| element.parse_literal(lexer))?;
                Ok(Value::Array(values))
            }
            DataType::Map(key, value) => {
                let entries = Self::parse_list(lexer, '{', '}', |lexer| {
                    let k = key.parse_literal(lexer)?;
                    lexer.consume(':')?;
                    let v = value.parse_literal(lexer)?;
                    Ok((k, v))
                })?;
                Ok(Value::Map(entries))
            }
            DataType::Tuple(fields) => {
                lexer.consume('(')?;
                let mut values = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        lexer.consume(',')?;
                    }
                    values.push(field.dtype.parse_literal(lexer)?);
                }
                lexer.consume(')')?;
                Ok(Value::Tuple(values))
            }
            DataType::BitMap64 => {
                let values = Self::parse_list(lexer, '[', ']', |lexer| {
                    DataType::UInt64.parse_literal(lexer)
                })?;
                self.coerce(Value::Array(values))
            }
            scalar => {
                let raw = if lexer.is_char_ahead('\'') {
                    Value::String(lexer.string_literal()?)
                } else {
                    let text = lexer.number_text()?;
                    scalar.number_value(text)?
                };
                self.coerce(raw)
                    .map_err(|e| e.with_context(format!("at position {start}")))
            }
        }
    }

    /// Parse a complete literal; trailing text is an error.
    pub fn parse_literal_str(&self, text: &str) -> ColwireResult<Value> {
        let mut lexer = TypeLexer::new(text);
        let value = self.parse_literal(&mut lexer)?;
        if !lexer.eof() {
            return Err(lexer.error("unexpected text after literal"));
        }
        Ok(value)
    }

    /// The type whose literal syntax applies; `Nullable` and `LowCardinality` add none.
    fn unwrap_literal_type(&self) -> &DataType {
        match self {
            DataType::Nullable(inner) | DataType::LowCardinality(inner) => {
                inner.unwrap_literal_type()
            }
            other => other,
        }
    }

    fn number_value(&self, text: &str) -> ColwireResult<Value> {
        match self {
            DataType::Decimal(_) if !text.contains(['e', 'E', 'x', 'X', 'b', 'B']) => {
                DecimalValue::parse(text).map(Value::Decimal)
            }
            DataType::UInt128 | DataType::UInt256 if text.bytes().all(|b| b.is_ascii_digit()) => {
                U256::parse_decimal(text).map(Value::UInt256)
            }
            _ => Ok(match Number::parse(text)? {
                Number::I32(v) => Value::Int32(v),
                Number::I64(v) => Value::Int64(v),
                Number::U64(v) => Value::UInt64(v),
                Number::I128(v) => Value::Int128(v),
                Number::F32(v) => Value::Float32(v),
                Number::F64(v) => Value::Float64(v),
            }),
        }
    }

    fn parse_list<T>(
        lexer: &mut TypeLexer<'_>,
        open: char,
        close: char,
        mut item: impl FnMut(&mut TypeLexer<'_>) -> ColwireResult<T>,
    ) -> ColwireResult<Vec<T>> {
        lexer.consume(open)?;
        let mut items = Vec::new();
        if lexer.try_consume(close) {
            return Ok(items);
        }
        loop {
            items.push(item(lexer)?);
            if lexer.try_consume(close) {
                return Ok(items);
            }
            if !lexer.try_consume(',') {
                return Err(lexer.error(format!("expected ',' or '{close}'")));
            }
        }
    }
}

/// Parse a literal for the type named `type_name`, resolving the name through the global
/// registry.
pub fn parse_literal(type_name: &str, text: &str) -> ColwireResult<Value> {
    crate::TypeRegistry::global()
        .get(type_name)?
        .parse_literal_str(text)
        .map_err(|e| e.with_context(format!("parsing {type_name} literal")))
}

#[cfg(test)]
mod tests {
    use colwire_error::ErrorCode;
    use jiff::civil::date;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Int32", " -42 ", Value::Int32(-42))]
    #[case("UInt8", "0x1A", Value::UInt8(26))]
    #[case("UInt8", "true", Value::UInt8(1))]
    #[case("Float64", "1e10", Value::Float64(1e10))]
    #[case("Float32", "3.5", Value::Float32(3.5))]
    #[case("Nullable(String)", "NULL", Value::Null)]
    #[case("String", "'it''s'", Value::from("it's"))]
    #[case("Date", "'2000-01-01'", Value::Date(date(2000, 1, 1)))]
    #[case("Decimal(10, 3)", "12.5", Value::Decimal(DecimalValue::new(12500, 3)))]
    #[case("UInt256", "340282366920938463463374607431768211456", Value::UInt256(U256::from_parts(1, 0)))]
    #[case("Array(Int8)", "[1, 2,3]", Value::Array(vec![Value::Int8(1), Value::Int8(2), Value::Int8(3)]))]
    #[case("Array(Nullable(Int8))", "[]", Value::Array(vec![]))]
    #[case("Map(String, String)", "{'a':'b'}", Value::Map(vec![(Value::from("a"), Value::from("b"))]))]
    #[case("Tuple(Int8, String)", "(1, 'x')", Value::Tuple(vec![Value::Int8(1), Value::from("x")]))]
    #[case("Enum8('a' = 1, 'b' = 2)", "'b'", Value::from("b"))]
    #[case("LowCardinality(Nullable(String))", "null", Value::Null)]
    fn literals(#[case] type_name: &str, #[case] text: &str, #[case] expected: Value) {
        assert_eq!(parse_literal(type_name, text).unwrap(), expected);
    }

    #[rstest]
    #[case("Int32", "NULL")]
    #[case("Int8", "300")]
    #[case("Array(Int8)", "[1 2]")]
    #[case("Array(Int8)", "[1, 2")]
    #[case("Map(String, Int8)", "{'a' 1}")]
    #[case("Date", "'2000-02-30'")]
    #[case("String", "'open")]
    #[case("Int32", "1 2")]
    fn malformed_literals(#[case] type_name: &str, #[case] text: &str) {
        assert!(parse_literal(type_name, text).is_err());
    }

    #[test]
    fn nested_literal_leaves_cursor() {
        let dtype = DataType::Array(std::sync::Arc::new(DataType::String));
        let mut lexer = TypeLexer::new("['a', 'b'], 7");
        let value = dtype.parse_literal(&mut lexer).unwrap();
        assert_eq!(value, Value::Array(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(lexer.remaining(), ", 7");
    }

    #[test]
    fn null_for_non_nullable_is_a_type_error() {
        let err = parse_literal("String", "NULL").unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataType);
    }
}
