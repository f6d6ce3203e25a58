use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

use colwire_column::Block;
use colwire_dtype::TypeRegistry;
use colwire_error::{ColwireResult, colwire_bail};
use colwire_io::Transport;
use uuid::Uuid;

use crate::{
    ClientConfig, ProfileInfo, Progress, QueryStage, Request, ServerInfo, ServerResponse,
};

/// Where a connection is in its request and response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Connected, nothing sent yet.
    Idle,
    /// Hello sent, waiting for the server's.
    AwaitingHello,
    /// Ready for the next request.
    Ready,
    /// A query was sent and its responses are being read.
    Streaming,
    /// An insert's sample block was received and data blocks may be sent.
    Inserting,
    /// A transport or protocol error left the stream in an unknown position.
    Broken,
}

impl Display for ClientState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingHello => "awaiting hello",
            Self::Ready => "ready",
            Self::Streaming => "streaming",
            Self::Inserting => "inserting",
            Self::Broken => "broken",
        })
    }
}

/// Everything a query returned, collected by [`ProtocolClient::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// The column names and types, from the first, empty, data block.
    pub header: Option<Block>,
    /// Every data block with rows, in the order received.
    pub blocks: Vec<Block>,
    pub totals: Option<Block>,
    pub extremes: Option<Block>,
    pub progress: Progress,
    pub profile_info: Option<ProfileInfo>,
}

impl QueryResult {
    /// The number of data rows across all blocks.
    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(Block::row_count).sum()
    }
}

/// A client connection speaking the native protocol over a blocking stream.
///
/// One query runs at a time: send it, then read responses until
/// [`ServerResponse::EndOfStream`] or an exception returns the client to
/// [`ClientState::Ready`].
pub struct ProtocolClient<S> {
    transport: Transport<S>,
    config: ClientConfig,
    registry: TypeRegistry,
    state: ClientState,
    server: Option<ServerInfo>,
    progress: Progress,
    profile_info: Option<ProfileInfo>,
}

impl<S: Read + Write> ProtocolClient<S> {
    pub fn new(stream: S, config: ClientConfig) -> Self {
        Self {
            transport: Transport::new(stream).with_compression(config.compression),
            config,
            registry: TypeRegistry::global().clone(),
            state: ClientState::Idle,
            server: None,
            progress: Progress::default(),
            profile_info: None,
        }
    }

    /// Resolve column types through `registry` instead of the global one.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The server's hello, once the handshake is done.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// The revision both sides encode for.
    pub fn revision(&self) -> u64 {
        self.server
            .as_ref()
            .map_or(self.config.revision, |s| s.revision.min(self.config.revision))
    }

    /// Progress of the current or last query, summed over its progress messages.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn profile_info(&self) -> Option<&ProfileInfo> {
        self.profile_info.as_ref()
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }

    fn expect_state(&self, expected: ClientState, action: &str) -> ColwireResult<()> {
        if self.state != expected {
            colwire_bail!(InvalidArgument: "cannot {} while the connection is {}", action, self.state);
        }
        Ok(())
    }

    fn broken_on_err<T>(&mut self, result: ColwireResult<T>) -> ColwireResult<T> {
        if result.is_err() {
            self.state = ClientState::Broken;
        }
        result
    }

    fn receive(&mut self) -> ColwireResult<ServerResponse> {
        let revision = self.revision();
        let response = ServerResponse::read_from(&mut self.transport, &self.registry, revision);
        self.broken_on_err(response)
    }

    /// Exchange hellos with the server.
    pub fn handshake(&mut self) -> ColwireResult<&ServerInfo> {
        self.expect_state(ClientState::Idle, "handshake")?;
        let sent = Request::Hello {
            config: &self.config,
        }
        .write_to(&mut self.transport, self.config.revision)
        .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)?;
        self.state = ClientState::AwaitingHello;

        match self.receive()? {
            ServerResponse::Hello(info) => {
                log::debug!("connected to {info}");
                self.state = ClientState::Ready;
                Ok(&*self.server.insert(info))
            }
            ServerResponse::Exception(e) => {
                self.state = ClientState::Broken;
                Err(e.into())
            }
            other => {
                self.state = ClientState::Broken;
                colwire_bail!(Protocol: "expected Hello from server, received {}", other.packet())
            }
        }
    }

    /// Send a query under a fresh query id, which is returned.
    pub fn send_query(&mut self, query: &str) -> ColwireResult<String> {
        let query_id = Uuid::new_v4().to_string();
        self.send_query_with(&query_id, query, QueryStage::Complete, &Block::default())?;
        Ok(query_id)
    }

    /// Send a query followed by `data`, the inline block of a parameterized query. An empty
    /// block sends no rows.
    pub fn send_query_with(
        &mut self,
        query_id: &str,
        query: &str,
        stage: QueryStage,
        data: &Block,
    ) -> ColwireResult<()> {
        self.expect_state(ClientState::Ready, "send a query")?;
        log::debug!(
            "sending query {query_id} at stage {stage}, compression {}",
            self.config
                .compression
                .map_or_else(|| "off".to_string(), |m| m.to_string())
        );
        let revision = self.revision();
        let sent = Request::Query {
            query_id,
            query,
            stage,
            config: &self.config,
        }
        .write_to(&mut self.transport, revision)
        .and_then(|()| {
            Request::Data {
                table: "",
                block: data,
            }
            .write_to(&mut self.transport, revision)
        })
        .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)?;

        self.progress = Progress::default();
        self.profile_info = None;
        self.state = ClientState::Streaming;
        Ok(())
    }

    /// Read the next response of the running query.
    ///
    /// End of stream returns the client to [`ClientState::Ready`]. A server exception does too,
    /// and is returned as the error with its whole cause chain.
    pub fn next_response(&mut self) -> ColwireResult<ServerResponse> {
        self.expect_state(ClientState::Streaming, "read a response")?;
        let response = self.receive()?;
        match response {
            ServerResponse::Exception(e) => {
                self.state = ClientState::Ready;
                return Err(e.into());
            }
            ServerResponse::EndOfStream => self.state = ClientState::Ready,
            ServerResponse::Progress(ref progress) => self.progress.merge(progress),
            ServerResponse::ProfileInfo(info) => self.profile_info = Some(info),
            ServerResponse::Hello(_) | ServerResponse::Pong => {
                self.state = ClientState::Broken;
                colwire_bail!(Protocol: "unexpected {} while reading query results", response.packet());
            }
            _ => {}
        }
        Ok(response)
    }

    /// Run a query and collect everything it returns.
    pub fn query(&mut self, query: &str) -> ColwireResult<QueryResult> {
        self.send_query(query)?;
        let mut result = QueryResult::default();
        loop {
            match self.next_response()? {
                ServerResponse::Data { block, .. } => {
                    if block.row_count() > 0 {
                        result.blocks.push(block);
                    } else if result.header.is_none() {
                        result.header = Some(block);
                    }
                }
                ServerResponse::Totals { block, .. } => result.totals = Some(block),
                ServerResponse::Extremes { block, .. } => result.extremes = Some(block),
                ServerResponse::EndOfStream => break,
                _ => {}
            }
        }
        result.progress = self.progress;
        result.profile_info = self.profile_info;
        Ok(result)
    }

    /// Ask the server whether the connection is alive.
    pub fn ping(&mut self) -> ColwireResult<()> {
        self.expect_state(ClientState::Ready, "ping")?;
        let revision = self.revision();
        let sent = Request::Ping
            .write_to(&mut self.transport, revision)
            .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)?;
        loop {
            match self.receive()? {
                ServerResponse::Pong => return Ok(()),
                ServerResponse::Progress(_) => {}
                ServerResponse::Exception(e) => return Err(e.into()),
                other => {
                    self.state = ClientState::Broken;
                    colwire_bail!(Protocol: "expected Pong from server, received {}", other.packet());
                }
            }
        }
    }

    /// Ask the server to stop the running query. Its remaining responses must still be read
    /// until the end of stream.
    pub fn cancel(&mut self) -> ColwireResult<()> {
        if !matches!(self.state, ClientState::Streaming | ClientState::Inserting) {
            colwire_bail!(InvalidArgument: "cannot cancel while the connection is {}", self.state);
        }
        let revision = self.revision();
        let sent = Request::Cancel
            .write_to(&mut self.transport, revision)
            .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)?;
        self.state = ClientState::Streaming;
        Ok(())
    }

    /// Send an `INSERT ... VALUES` query and return an empty block, shaped like the server's
    /// sample block, to fill with rows.
    pub fn insert_sample_block(&mut self, query: &str) -> ColwireResult<Block> {
        self.send_query(query)?;
        loop {
            match self.next_response()? {
                ServerResponse::Data { block, .. } => {
                    log::debug!(
                        "insert sample block has {} columns",
                        block.column_count()
                    );
                    self.state = ClientState::Inserting;
                    return Ok(Block::from_sample(&block));
                }
                ServerResponse::EndOfStream => {
                    colwire_bail!(Protocol: "server sent no sample block for the insert")
                }
                _ => {}
            }
        }
    }

    /// Send one block of rows for the running insert. Empty blocks are not sent, as an empty
    /// block ends the insert.
    pub fn send_block(&mut self, block: &Block) -> ColwireResult<()> {
        self.expect_state(ClientState::Inserting, "send a block")?;
        if block.row_count() == 0 {
            return Ok(());
        }
        let revision = self.revision();
        let sent = Request::Data { table: "", block }
            .write_to(&mut self.transport, revision)
            .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)
    }

    /// End the running insert and read the server's responses until the end of stream.
    pub fn finish_insert(&mut self) -> ColwireResult<Progress> {
        self.expect_state(ClientState::Inserting, "finish an insert")?;
        let revision = self.revision();
        let end = Block::default();
        let sent = Request::Data {
            table: "",
            block: &end,
        }
        .write_to(&mut self.transport, revision)
        .and_then(|()| self.transport.flush());
        self.broken_on_err(sent)?;
        self.state = ClientState::Streaming;
        while !matches!(self.next_response()?, ServerResponse::EndOfStream) {}
        Ok(self.progress)
    }
}
