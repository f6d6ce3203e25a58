use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use colwire_error::{ColwireResult, colwire_bail, colwire_err};
use moka::policy::EvictionPolicy;
use moka::sync::{Cache, CacheBuilder};

use crate::{DataType, EnumDType, Number, TupleField, TypeLexer};

/// The number of distinct type names kept by [`TypeRegistry::default`].
pub const DEFAULT_TYPE_CACHE_CAPACITY: u64 = 512;

static GLOBAL: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::default);

/// Scalar types by lower-cased name, including their SQL aliases.
static SCALARS: LazyLock<HashMap<&'static str, DataType>> = LazyLock::new(|| {
    let aliases: &[(DataType, &[&str])] = &[
        (DataType::Int8, &["int8", "tinyint", "int1", "byte"]),
        (DataType::Int16, &["int16", "smallint", "int2"]),
        (DataType::Int32, &["int32", "int", "integer", "int4"]),
        (DataType::Int64, &["int64", "bigint"]),
        (DataType::Int128, &["int128"]),
        (DataType::UInt8, &["uint8", "bool", "boolean"]),
        (DataType::UInt16, &["uint16"]),
        (DataType::UInt32, &["uint32"]),
        (DataType::UInt64, &["uint64"]),
        (DataType::UInt128, &["uint128"]),
        (DataType::UInt256, &["uint256"]),
        (DataType::Float32, &["float32", "float", "real", "single"]),
        (DataType::Float64, &["float64", "double"]),
        (DataType::Date, &["date"]),
        (DataType::Uuid, &["uuid"]),
        (DataType::IPv4, &["ipv4", "inet4"]),
        (DataType::IPv6, &["ipv6", "inet6"]),
        (DataType::BitMap64, &["bitmap64"]),
    ];
    aliases
        .iter()
        .flat_map(|(dtype, names)| names.iter().map(move |name| (*name, dtype.clone())))
        .collect()
});

/// Names that resolve to `String`; a parenthesized length is accepted and ignored.
const STRING_ALIASES: &[&str] = &[
    "string",
    "text",
    "varchar",
    "char",
    "character",
    "nchar",
    "nvarchar",
    "blob",
    "clob",
    "tinytext",
    "mediumtext",
    "longtext",
    "tinyblob",
    "mediumblob",
    "longblob",
    "bytea",
];

/// Resolves type names into [`DataType`]s, caching the result for each distinct name.
///
/// The cache is bounded and evicts the least recently used names. Lookups never block each
/// other; two threads that miss on the same name both parse it and the second insert simply
/// replaces an identical descriptor.
#[derive(Clone)]
pub struct TypeRegistry {
    cache: Cache<String, DataType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TYPE_CACHE_CAPACITY)
    }
}

impl TypeRegistry {
    /// A registry caching up to `capacity` type names.
    pub fn with_capacity(capacity: u64) -> Self {
        let cache = CacheBuilder::new(capacity)
            .name("colwire-type-cache")
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|name: Arc<String>, _dtype: DataType, _cause| {
                log::trace!("Evicted cached type {name}");
            })
            .build();
        Self { cache }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Resolve a complete type name. Trailing text after the type is an error.
    pub fn get(&self, name: &str) -> ColwireResult<DataType> {
        if let Some(dtype) = self.cache.get(name) {
            return Ok(dtype);
        }
        let mut lexer = TypeLexer::new(name);
        let dtype = Self::parse(&mut lexer)?;
        if !lexer.eof() {
            return Err(lexer.error("unexpected text after type"));
        }
        log::trace!("Parsed type name {name} as {dtype}");
        self.cache.insert(name.to_string(), dtype.clone());
        Ok(dtype)
    }

    /// The number of cached type names.
    pub fn cached_len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Parse one type from the cursor, leaving it just past the type.
    pub fn parse(lexer: &mut TypeLexer<'_>) -> ColwireResult<DataType> {
        let word = lexer.bare_word()?;
        let lower = word.to_ascii_lowercase();
        let dtype = match lower.as_str() {
            "tuple" => Self::parse_tuple(lexer)?,
            "array" => {
                lexer.consume('(')?;
                let element = Self::parse(lexer)?;
                lexer.consume(')')?;
                DataType::Array(Arc::new(element))
            }
            "enum8" => {
                let entries = Self::parse_enum(lexer, i8::MIN.into(), i8::MAX.into())?;
                DataType::Enum8(Arc::new(entries))
            }
            "enum16" => {
                let entries = Self::parse_enum(lexer, i16::MIN, i16::MAX)?;
                DataType::Enum16(Arc::new(entries))
            }
            "datetime" => {
                if lexer.try_consume('(') {
                    let tz = lexer.string_literal()?;
                    lexer.consume(')')?;
                    DataType::DateTime(Some(tz.into()))
                } else {
                    DataType::DateTime(None)
                }
            }
            "datetime64" => {
                lexer.consume('(')?;
                let precision = Self::parse_u8(lexer)?;
                let tz = if lexer.try_consume(',') {
                    Some(lexer.string_literal()?)
                } else {
                    None
                };
                lexer.consume(')')?;
                DataType::datetime64(precision, tz.as_deref())?
            }
            "nullable" => {
                lexer.consume('(')?;
                let nested = Self::parse(lexer)?;
                lexer.consume(')')?;
                DataType::nullable(nested)?
            }
            "fixedstring" | "binary" => {
                lexer.consume('(')?;
                let n = Self::parse_integer(lexer)?;
                lexer.consume(')')?;
                let n = usize::try_from(n)
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| colwire_err!(DataType: "invalid FixedString length {}", n))?;
                DataType::FixedString(n)
            }
            "decimal" => {
                lexer.consume('(')?;
                let precision = Self::parse_u8(lexer)?;
                let scale = if lexer.try_consume(',') {
                    Self::parse_u8(lexer)?
                } else {
                    0
                };
                lexer.consume(')')?;
                DataType::decimal(precision, scale)?
            }
            "decimal32" | "decimal64" | "decimal128" => {
                let precision = match lower.as_str() {
                    "decimal32" => 9,
                    "decimal64" => 18,
                    _ => 38,
                };
                lexer.consume('(')?;
                let scale = Self::parse_u8(lexer)?;
                lexer.consume(')')?;
                DataType::decimal(precision, scale)?
            }
            "nothing" => DataType::Nothing,
            "lowcardinality" => {
                lexer.consume('(')?;
                let nested = Self::parse(lexer)?;
                lexer.consume(')')?;
                DataType::low_cardinality(nested)?
            }
            "map" => {
                lexer.consume('(')?;
                let key = Self::parse(lexer)?;
                lexer.consume(',')?;
                let value = Self::parse(lexer)?;
                lexer.consume(')')?;
                DataType::map(key, value)?
            }
            s if STRING_ALIASES.contains(&s) => {
                if lexer.try_consume('(') {
                    Self::parse_integer(lexer)?;
                    lexer.consume(')')?;
                }
                DataType::String
            }
            s => match SCALARS.get(s) {
                Some(dtype) => dtype.clone(),
                None => colwire_bail!(DataType: "unknown data type '{}'", word),
            },
        };
        Ok(dtype)
    }

    fn parse_tuple(lexer: &mut TypeLexer<'_>) -> ColwireResult<DataType> {
        lexer.consume('(')?;
        let mut fields = Vec::new();
        loop {
            let field_start = lexer.pos();
            let name = if lexer.is_word_ahead() {
                let word = lexer.bare_word()?;
                if lexer.is_word_ahead() {
                    Some(word.into_owned())
                } else {
                    lexer.reset(field_start);
                    None
                }
            } else {
                None
            };
            let dtype = Self::parse(lexer)?;
            fields.push(match name {
                Some(name) => TupleField::named(name, dtype),
                None => TupleField::unnamed(dtype),
            });
            if !lexer.try_consume(',') {
                break;
            }
        }
        lexer.consume(')')?;
        Ok(DataType::Tuple(fields.into()))
    }

    fn parse_enum(lexer: &mut TypeLexer<'_>, min: i16, max: i16) -> ColwireResult<EnumDType> {
        lexer.consume('(')?;
        let mut entries = Vec::new();
        loop {
            let name = lexer.string_literal()?;
            lexer.consume('=')?;
            let code = Self::parse_integer(lexer)?;
            let code = i16::try_from(code)
                .ok()
                .filter(|c| (min..=max).contains(c))
                .ok_or_else(|| colwire_err!(DataType: "enum value {} is out of range", code))?;
            entries.push((name, code));
            if !lexer.try_consume(',') {
                break;
            }
        }
        lexer.consume(')')?;
        EnumDType::try_new(entries)
    }

    fn parse_integer(lexer: &mut TypeLexer<'_>) -> ColwireResult<i128> {
        match lexer.number_literal()? {
            n @ (Number::F32(_) | Number::F64(_)) => {
                Err(lexer.error(format!("expected an integer, found {n}")))
            }
            n => n
                .as_i128()
                .ok_or_else(|| lexer.error("expected an integer")),
        }
    }

    fn parse_u8(lexer: &mut TypeLexer<'_>) -> ColwireResult<u8> {
        let n = Self::parse_integer(lexer)?;
        u8::try_from(n).map_err(|_| colwire_err!(DataType: "type argument {} is out of range", n))
    }
}

#[cfg(test)]
mod tests {
    use colwire_error::ErrorCode;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Int8")]
    #[case("UInt256")]
    #[case("Array(Nullable(Map(String, Array(Int32))))")]
    #[case("LowCardinality(Nullable(String))")]
    #[case("Map(LowCardinality(String), Tuple(UInt8, Array(Float64)))")]
    #[case("Tuple(a Int32, b Nullable(String))")]
    #[case("Tuple(`first col` Int32, x DateTime('Asia/Shanghai'))")]
    #[case("Enum8('a' = 1, 'b' = -2)")]
    #[case("Enum16('x\\'y' = 1000)")]
    #[case("DateTime64(3, 'UTC')")]
    #[case("DateTime64(6)")]
    #[case("Decimal(10, 2)")]
    #[case("FixedString(16)")]
    #[case("Array(Array(Array(LowCardinality(FixedString(2)))))")]
    #[case("BitMap64")]
    fn canonical_names_round_trip(#[case] name: &str) {
        let registry = TypeRegistry::default();
        let dtype = registry.get(name).unwrap();
        assert_eq!(dtype.name(), name);
        assert_eq!(registry.get(&dtype.name()).unwrap(), dtype);
    }

    #[rstest]
    #[case("INT", "Int32")]
    #[case("bigint", "Int64")]
    #[case("DOUBLE", "Float64")]
    #[case("boolean", "UInt8")]
    #[case("VARCHAR(255)", "String")]
    #[case("text", "String")]
    #[case("binary(4)", "FixedString(4)")]
    #[case("Decimal32(4)", "Decimal(9, 4)")]
    #[case("decimal128(10)", "Decimal(38, 10)")]
    #[case("decimal(5)", "Decimal(5, 0)")]
    #[case("  array ( nullable ( int )  ) ", "Array(Nullable(Int32))")]
    #[case("Tuple(DateTime, Int8)", "Tuple(DateTime, Int8)")]
    #[case("Map(String, Decimal64(2))", "Map(String, Decimal(18, 2))")]
    fn aliases(#[case] name: &str, #[case] canonical: &str) {
        assert_eq!(TypeRegistry::default().get(name).unwrap().name(), canonical);
    }

    #[rstest]
    #[case("Foo", ErrorCode::DataType)]
    #[case("Array(Foo)", ErrorCode::DataType)]
    #[case("Int32 garbage", ErrorCode::Syntax)]
    #[case("Array(Int32", ErrorCode::Syntax)]
    #[case("Nullable(Array(Int8))", ErrorCode::DataType)]
    #[case("Nullable(Nullable(Int8))", ErrorCode::DataType)]
    #[case("LowCardinality(Array(String))", ErrorCode::DataType)]
    #[case("Map(Array(Int8), String)", ErrorCode::DataType)]
    #[case("Decimal(39, 2)", ErrorCode::DataType)]
    #[case("Enum8('a' = 200)", ErrorCode::DataType)]
    #[case("FixedString(1.5)", ErrorCode::Syntax)]
    #[case("DateTime64(12)", ErrorCode::DataType)]
    fn rejects(#[case] name: &str, #[case] code: ErrorCode) {
        assert_eq!(TypeRegistry::default().get(name).unwrap_err().code(), code);
    }

    #[test]
    fn unknown_type_names_the_token() {
        let err = TypeRegistry::default().get("Array(Foo)").unwrap_err();
        assert!(err.to_string().contains("unknown data type 'Foo'"));
    }

    #[test]
    fn nested_parse_leaves_cursor_after_type() {
        let mut lexer = TypeLexer::new("Array(Int8), rest");
        let dtype = TypeRegistry::parse(&mut lexer).unwrap();
        assert_eq!(dtype.name(), "Array(Int8)");
        assert_eq!(lexer.remaining(), ", rest");
    }

    #[test]
    fn cache_is_bounded() {
        let registry = TypeRegistry::with_capacity(4);
        for n in 1..=32 {
            registry.get(&format!("FixedString({n})")).unwrap();
        }
        assert!(registry.cached_len() <= 4);
        assert_eq!(registry.get("FixedString(3)").unwrap(), DataType::FixedString(3));
    }

    #[test]
    fn concurrent_lookups_agree() {
        let registry = TypeRegistry::default();
        let names = ["Array(String)", "Map(String, UInt64)", "Nullable(Int32)"];
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for name in names {
                        assert_eq!(registry.get(name).unwrap().name(), name);
                    }
                });
            }
        });
        assert_eq!(registry.cached_len(), 3);
    }
}
