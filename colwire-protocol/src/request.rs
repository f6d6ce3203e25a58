use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

use colwire_column::Block;
use colwire_error::ColwireResult;
use colwire_io::{Transport, WireWrite};

use crate::ClientConfig;
use crate::revision::{
    MIN_REVISION_WITH_BLOCK_INFO, MIN_REVISION_WITH_CLIENT_INFO,
    MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO, MIN_REVISION_WITH_TEMPORARY_TABLES,
    MIN_REVISION_WITH_VERSION_PATCH,
};

/// The tag of each message a client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPacket {
    Hello = 0,
    Query = 1,
    Data = 2,
    Cancel = 3,
    Ping = 4,
}

/// How far the server processes a query before returning results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStage {
    FetchColumns = 0,
    WithMergeableState = 1,
    #[default]
    Complete = 2,
    WithMergeableStateAfterAggregation = 3,
}

impl Display for QueryStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FetchColumns => "FETCH_COLUMNS",
            Self::WithMergeableState => "WITH_MERGEABLE_STATE",
            Self::Complete => "COMPLETE",
            Self::WithMergeableStateAfterAggregation => "WITH_MERGEABLE_STATE_AFTER_AGGREGATION",
        })
    }
}

const QUERY_KIND_INITIAL: u8 = 1;
const INTERFACE_TCP: u8 = 1;
const INITIAL_ADDRESS: &str = "0.0.0.0:0";

/// A message from the client to the server.
#[derive(Debug)]
pub enum Request<'a> {
    /// Identify the client and authenticate.
    Hello { config: &'a ClientConfig },
    /// Run a query. Always followed by a [`Request::Data`] carrying the end of the query's
    /// external tables.
    Query {
        query_id: &'a str,
        query: &'a str,
        stage: QueryStage,
        config: &'a ClientConfig,
    },
    /// A block of rows; an empty block ends a stream of them.
    Data { table: &'a str, block: &'a Block },
    /// Stop the running query.
    Cancel,
    /// Check the connection is alive.
    Ping,
}

impl Request<'_> {
    pub fn packet(&self) -> ClientPacket {
        match self {
            Self::Hello { .. } => ClientPacket::Hello,
            Self::Query { .. } => ClientPacket::Query,
            Self::Data { .. } => ClientPacket::Data,
            Self::Cancel => ClientPacket::Cancel,
            Self::Ping => ClientPacket::Ping,
        }
    }

    /// Write the message for a session negotiated at `revision`. Nothing is flushed.
    pub fn write_to<S: Read + Write>(
        &self,
        transport: &mut Transport<S>,
        revision: u64,
    ) -> ColwireResult<()> {
        transport.write_varint(self.packet() as u64)?;
        match self {
            Self::Hello { config } => {
                let (user, password) = config.credentials.resolve()?;
                transport.write_string(&config.client_name)?;
                transport.write_varint(config.version_major)?;
                transport.write_varint(config.version_minor)?;
                transport.write_varint(config.revision)?;
                transport.write_string(&config.database)?;
                transport.write_string(&user)?;
                transport.write_string(&password)
            }
            Self::Query {
                query_id,
                query,
                stage,
                config,
            } => {
                transport.write_string(query_id)?;
                if revision >= MIN_REVISION_WITH_CLIENT_INFO {
                    write_client_info(transport, config, revision)?;
                }
                config.settings.write_to(transport)?;
                transport.write_varint(*stage as u64)?;
                transport.write_bool(config.compression.is_some())?;
                transport.write_string(query)
            }
            Self::Data { table, block } => {
                if revision >= MIN_REVISION_WITH_TEMPORARY_TABLES {
                    transport.write_string(table)?;
                }
                transport.compressed(|t| block.write_to(t, revision >= MIN_REVISION_WITH_BLOCK_INFO))
            }
            Self::Cancel | Self::Ping => Ok(()),
        }
    }
}

fn write_client_info<W: WireWrite>(
    out: &mut W,
    config: &ClientConfig,
    revision: u64,
) -> ColwireResult<()> {
    out.write_u8(QUERY_KIND_INITIAL)?;
    out.write_string("")?;
    out.write_string("")?;
    out.write_string(INITIAL_ADDRESS)?;
    out.write_u8(INTERFACE_TCP)?;
    out.write_string(&config.os_user)?;
    out.write_string(&config.client_hostname)?;
    out.write_string(&config.client_name)?;
    out.write_varint(config.version_major)?;
    out.write_varint(config.version_minor)?;
    out.write_varint(config.revision)?;
    if revision >= MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
        out.write_string(&config.quota_key)?;
    }
    if revision >= MIN_REVISION_WITH_VERSION_PATCH {
        out.write_varint(config.version_patch)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use colwire_io::MemoryStream;

    use super::*;
    use crate::{Credentials, Settings};

    fn written(request: Request<'_>, revision: u64) -> Vec<u8> {
        let mut transport = Transport::new(MemoryStream::new(Vec::new()));
        request.write_to(&mut transport, revision).unwrap();
        transport.flush().unwrap();
        transport.get_ref().written().to_vec()
    }

    #[test]
    fn hello_layout() {
        let config = ClientConfig::default()
            .with_client_name("c")
            .with_version(2, 3, 4)
            .with_database("db")
            .with_credentials(Credentials::password("u", "p"));
        let mut expected = vec![0, 1, b'c', 2, 3];
        expected.extend_from_slice(&[0x85, 0xa9, 0x03]);
        expected.extend_from_slice(b"\x02db\x01u\x01p");
        assert_eq!(written(Request::Hello { config: &config }, 0), expected);
    }

    #[test]
    fn old_servers_get_no_client_info() {
        let config = ClientConfig::default().with_settings(Settings::new().with("a", 1u64));
        let request = Request::Query {
            query_id: "q",
            query: "SELECT 1",
            stage: QueryStage::Complete,
            config: &config,
        };
        assert_eq!(
            written(request, MIN_REVISION_WITH_CLIENT_INFO - 1),
            b"\x01\x01q\x01a\x01\x00\x02\x00\x08SELECT 1"
        );
    }

    #[test]
    fn client_info_follows_query_id() {
        let config = ClientConfig::default()
            .with_client_name("c")
            .with_os_user("me")
            .with_client_hostname("h");
        let request = Request::Query {
            query_id: "",
            query: "",
            stage: QueryStage::FetchColumns,
            config: &config,
        };
        let bytes = written(request, MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO);
        let mut expected = vec![1, 0, QUERY_KIND_INITIAL, 0, 0];
        expected.extend_from_slice(b"\x090.0.0.0:0\x01\x02me\x01h\x01c\x01\x00");
        expected.extend_from_slice(&[0x85, 0xa9, 0x03]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn empty_data_block() {
        let block = Block::default();
        let bytes = written(
            Request::Data {
                table: "",
                block: &block,
            },
            MIN_REVISION_WITH_BLOCK_INFO,
        );
        assert_eq!(bytes, [2, 0, 1, 0, 2, 0xff, 0xff, 0xff, 0xff, 0, 0, 0]);
        assert_eq!(written(Request::Ping, 0), [4]);
        assert_eq!(written(Request::Cancel, 0), [3]);
    }
}
