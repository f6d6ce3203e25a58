//! Native-protocol codec for columnar analytical databases.
//!
//! The pieces build on each other: [`io`] moves bytes, [`dtype`] describes and encodes single
//! values, [`column`] encodes whole columns and blocks, and [`protocol`] frames them into the
//! messages of a client session.

pub use colwire_column::{Block, BlockColumn, Column};
pub use colwire_dtype::{DataType, TypeRegistry, Value};
pub use colwire_error::{ColwireError, ColwireResult, ErrorCode};
pub use colwire_protocol::{ClientConfig, ProtocolClient, QueryResult};
pub use {
    colwire_column as column, colwire_dtype as dtype, colwire_error as error, colwire_io as io,
    colwire_protocol as protocol,
};

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Array(Nullable(String))")]
    #[case("Map(String, LowCardinality(String))")]
    #[case("Tuple(a Int32, b DateTime('UTC'))")]
    fn parsed_types_build_blocks(#[case] name: &str) {
        let dtype = TypeRegistry::global().get(name).unwrap();
        let mut block = Block::new([("c", dtype.clone())]);
        block.set_value(0, dtype.default_value()).unwrap();
        block.append_row().unwrap();

        let mut bytes = Vec::new();
        block.write_to(&mut bytes, true).unwrap();
        let read = Block::read_from(&mut bytes.as_slice(), TypeRegistry::global(), true).unwrap();
        assert_eq!(read.row_count(), 1);
        assert_eq!(read.columns()[0].dtype(), &dtype);
        assert_eq!(read.get_object(0, 0).unwrap(), dtype.default_value());
    }
}
