use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

use colwire_column::Block;
use colwire_dtype::TypeRegistry;
use colwire_error::{ColwireResult, ServerException, colwire_bail};
use colwire_io::{Transport, WireRead};

use crate::revision::{
    MIN_REVISION_WITH_BLOCK_INFO, MIN_REVISION_WITH_CLIENT_WRITE_INFO,
    MIN_REVISION_WITH_SERVER_DISPLAY_NAME, MIN_REVISION_WITH_SERVER_TIMEZONE,
    MIN_REVISION_WITH_TEMPORARY_TABLES, MIN_REVISION_WITH_TOTAL_ROWS_IN_PROGRESS,
    MIN_REVISION_WITH_VERSION_PATCH,
};

/// Nested exception records beyond this depth are treated as a corrupt stream.
const MAX_EXCEPTION_DEPTH: usize = 64;

/// The tag of each message a server sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPacket {
    Hello = 0,
    Data = 1,
    Exception = 2,
    Progress = 3,
    Pong = 4,
    EndOfStream = 5,
    ProfileInfo = 6,
    Totals = 7,
    Extremes = 8,
    TablesStatus = 9,
    Log = 10,
    TableColumns = 11,
    QueryPlan = 12,
    AggregatedQueryPlan = 13,
    QueryMetadata = 14,
}

impl TryFrom<u64> for ServerPacket {
    type Error = colwire_error::ColwireError;

    fn try_from(tag: u64) -> ColwireResult<Self> {
        Ok(match tag {
            0 => Self::Hello,
            1 => Self::Data,
            2 => Self::Exception,
            3 => Self::Progress,
            4 => Self::Pong,
            5 => Self::EndOfStream,
            6 => Self::ProfileInfo,
            7 => Self::Totals,
            8 => Self::Extremes,
            9 => Self::TablesStatus,
            10 => Self::Log,
            11 => Self::TableColumns,
            12 => Self::QueryPlan,
            13 => Self::AggregatedQueryPlan,
            14 => Self::QueryMetadata,
            _ => colwire_bail!(Protocol: "unknown packet {} from server", tag),
        })
    }
}

/// What the server reported about itself in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub version_patch: u64,
    pub revision: u64,
    /// The server's timezone, or the local one for servers too old to send it.
    pub timezone: String,
    pub display_name: String,
}

impl ServerInfo {
    /// Read the server's hello. Optional fields are present when both the server's revision
    /// and `client_revision` are new enough.
    pub fn read_from<R: WireRead>(input: &mut R, client_revision: u64) -> ColwireResult<Self> {
        let name = input.read_string()?;
        let version_major = input.read_varint()?;
        let version_minor = input.read_varint()?;
        let revision = input.read_varint()?;
        let negotiated = revision.min(client_revision);
        let timezone = if negotiated >= MIN_REVISION_WITH_SERVER_TIMEZONE {
            input.read_string()?
        } else {
            colwire_dtype::datetime::system_timezone()
        };
        let display_name = if negotiated >= MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
            input.read_string()?
        } else {
            "localhost".to_string()
        };
        let version_patch = if negotiated >= MIN_REVISION_WITH_VERSION_PATCH {
            input.read_varint()?
        } else {
            0
        };
        Ok(Self {
            name,
            version_major,
            version_minor,
            version_patch,
            revision,
            timezone,
            display_name,
        })
    }
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}.{}.{} (revision {}, timezone {})",
            self.name,
            self.version_major,
            self.version_minor,
            self.version_patch,
            self.revision,
            self.timezone
        )
    }
}

/// Rows and bytes processed by a query so far. The server sends increments; the client sums
/// them with [`Progress::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub written_rows: u64,
    pub written_bytes: u64,
}

impl Progress {
    pub fn read_from<R: WireRead>(input: &mut R, revision: u64) -> ColwireResult<Self> {
        let mut progress = Self {
            rows: input.read_varint()?,
            bytes: input.read_varint()?,
            ..Self::default()
        };
        if revision >= MIN_REVISION_WITH_TOTAL_ROWS_IN_PROGRESS {
            progress.total_rows = input.read_varint()?;
        }
        if revision >= MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            progress.written_rows = input.read_varint()?;
            progress.written_bytes = input.read_varint()?;
        }
        Ok(progress)
    }

    pub fn merge(&mut self, other: &Progress) {
        self.rows = self.rows.saturating_add(other.rows);
        self.bytes = self.bytes.saturating_add(other.bytes);
        self.total_rows = self.total_rows.saturating_add(other.total_rows);
        self.written_rows = self.written_rows.saturating_add(other.written_rows);
        self.written_bytes = self.written_bytes.saturating_add(other.written_bytes);
    }
}

/// Execution statistics sent once the query's result is complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    pub fn read_from<R: WireRead>(input: &mut R) -> ColwireResult<Self> {
        Ok(Self {
            rows: input.read_varint()?,
            blocks: input.read_varint()?,
            bytes: input.read_varint()?,
            applied_limit: input.read_bool()?,
            rows_before_limit: input.read_varint()?,
            calculated_rows_before_limit: input.read_bool()?,
        })
    }
}

/// Read an exception record and every record nested in it.
pub fn read_exception<R: WireRead>(input: &mut R) -> ColwireResult<ServerException> {
    let mut records = Vec::new();
    loop {
        let code = input.read_i32()?;
        let name = input.read_string()?;
        let message = input.read_string()?;
        let mut record = ServerException::new(code, name, message);
        record.stack_trace = input.read_string()?;
        records.push(record);
        if !input.read_bool()? {
            break;
        }
        if records.len() >= MAX_EXCEPTION_DEPTH {
            colwire_bail!(Protocol: "exception chain deeper than {}", MAX_EXCEPTION_DEPTH);
        }
    }
    let mut chain = records.into_iter().rev();
    let Some(root) = chain.next() else {
        colwire_bail!(Protocol: "empty exception record");
    };
    Ok(chain.fold(root, |cause, outer| outer.with_cause(cause)))
}

/// A message from the server.
#[derive(Debug, Clone)]
pub enum ServerResponse {
    Hello(ServerInfo),
    Data { name: String, block: Block },
    Exception(ServerException),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
    Totals { name: String, block: Block },
    Extremes { name: String, block: Block },
    Log { name: String, block: Block },
    TableColumns { name: String, description: String },
    QueryPlan(Vec<String>),
    AggregatedQueryPlan(String),
    QueryMetadata { query_id: String },
}

impl ServerResponse {
    pub fn packet(&self) -> ServerPacket {
        match self {
            Self::Hello(_) => ServerPacket::Hello,
            Self::Data { .. } => ServerPacket::Data,
            Self::Exception(_) => ServerPacket::Exception,
            Self::Progress(_) => ServerPacket::Progress,
            Self::Pong => ServerPacket::Pong,
            Self::EndOfStream => ServerPacket::EndOfStream,
            Self::ProfileInfo(_) => ServerPacket::ProfileInfo,
            Self::Totals { .. } => ServerPacket::Totals,
            Self::Extremes { .. } => ServerPacket::Extremes,
            Self::Log { .. } => ServerPacket::Log,
            Self::TableColumns { .. } => ServerPacket::TableColumns,
            Self::QueryPlan(_) => ServerPacket::QueryPlan,
            Self::AggregatedQueryPlan(_) => ServerPacket::AggregatedQueryPlan,
            Self::QueryMetadata { .. } => ServerPacket::QueryMetadata,
        }
    }

    /// Read the next message of a session negotiated at `revision`. Data, totals and extremes
    /// blocks are compressed when the session is; log blocks never are.
    pub fn read_from<S: Read + Write>(
        transport: &mut Transport<S>,
        registry: &TypeRegistry,
        revision: u64,
    ) -> ColwireResult<Self> {
        let packet = ServerPacket::try_from(transport.read_varint()?)?;
        log::trace!("received {}", packet);
        let with_info = revision >= MIN_REVISION_WITH_BLOCK_INFO;
        let read_name = |t: &mut Transport<S>| -> ColwireResult<String> {
            if revision >= MIN_REVISION_WITH_TEMPORARY_TABLES {
                t.read_string()
            } else {
                Ok(String::new())
            }
        };
        let read_block = |t: &mut Transport<S>| -> ColwireResult<(String, Block)> {
            let name = read_name(t)?;
            let block = t.compressed(|t| Block::read_from(t, registry, with_info))?;
            Ok((name, block))
        };

        Ok(match packet {
            ServerPacket::Hello => Self::Hello(ServerInfo::read_from(transport, revision)?),
            ServerPacket::Data => {
                let (name, block) = read_block(transport)?;
                Self::Data { name, block }
            }
            ServerPacket::Exception => Self::Exception(read_exception(transport)?),
            ServerPacket::Progress => Self::Progress(Progress::read_from(transport, revision)?),
            ServerPacket::Pong => Self::Pong,
            ServerPacket::EndOfStream => Self::EndOfStream,
            ServerPacket::ProfileInfo => Self::ProfileInfo(ProfileInfo::read_from(transport)?),
            ServerPacket::Totals => {
                let (name, block) = read_block(transport)?;
                Self::Totals { name, block }
            }
            ServerPacket::Extremes => {
                let (name, block) = read_block(transport)?;
                Self::Extremes { name, block }
            }
            ServerPacket::TablesStatus => {
                colwire_bail!(Protocol: "tables status responses are not supported")
            }
            ServerPacket::Log => {
                let name = read_name(transport)?;
                let block = Block::read_from(transport, registry, with_info)?;
                Self::Log { name, block }
            }
            ServerPacket::TableColumns => Self::TableColumns {
                name: transport.read_string()?,
                description: transport.read_string()?,
            },
            ServerPacket::QueryPlan => {
                let lines = transport.read_length()?;
                let mut plan = Vec::with_capacity(lines.min(1024));
                for _ in 0..lines {
                    plan.push(transport.read_string()?);
                }
                Self::QueryPlan(plan)
            }
            ServerPacket::AggregatedQueryPlan => {
                Self::AggregatedQueryPlan(transport.read_string()?)
            }
            ServerPacket::QueryMetadata => Self::QueryMetadata {
                query_id: transport.read_string()?,
            },
        })
    }
}

impl Display for ServerPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Hello => "Hello",
            Self::Data => "Data",
            Self::Exception => "Exception",
            Self::Progress => "Progress",
            Self::Pong => "Pong",
            Self::EndOfStream => "EndOfStream",
            Self::ProfileInfo => "ProfileInfo",
            Self::Totals => "Totals",
            Self::Extremes => "Extremes",
            Self::TablesStatus => "TablesStatus",
            Self::Log => "Log",
            Self::TableColumns => "TableColumns",
            Self::QueryPlan => "QueryPlan",
            Self::AggregatedQueryPlan => "AggregatedQueryPlan",
            Self::QueryMetadata => "QueryMetadata",
        })
    }
}
