use std::sync::Arc;

use colwire_column::Block;
use colwire_dtype::{DataType, Value};
use colwire_error::ErrorCode;
use colwire_io::{CompressionMethod, MemoryStream, Transport, WireWrite, encode_frame};
use colwire_protocol::revision::CLIENT_REVISION;
use colwire_protocol::{
    ClientConfig, ClientState, ProtocolClient, QueryStage, Request, ServerResponse,
};

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn server_hello(out: &mut Vec<u8>, revision: u64) {
        out.write_varint(0).unwrap();
        out.write_string("ByteHouse").unwrap();
        out.write_varint(21).unwrap();
        out.write_varint(8).unwrap();
        out.write_varint(revision).unwrap();
        out.write_string("Asia/Singapore").unwrap();
        out.write_string("bh-1").unwrap();
        out.write_varint(3).unwrap();
    }

    fn server_block(out: &mut Vec<u8>, tag: u64, block: &Block, compression: Option<CompressionMethod>) {
        out.write_varint(tag).unwrap();
        out.write_string("").unwrap();
        let mut body = Vec::new();
        block.write_to(&mut body, true).unwrap();
        match compression {
            Some(method) => out.extend_from_slice(&encode_frame(method, &body).unwrap()),
            None => out.extend_from_slice(&body),
        }
    }

    fn server_progress(out: &mut Vec<u8>, rows: u64, bytes: u64, total_rows: u64) {
        out.write_varint(3).unwrap();
        out.write_varint(rows).unwrap();
        out.write_varint(bytes).unwrap();
        out.write_varint(total_rows).unwrap();
    }

    fn end_of_stream(out: &mut Vec<u8>) {
        out.write_varint(5).unwrap();
    }

    fn numbers_and_names(rows: &[(u64, &str)]) -> Block {
        let mut block = Block::new([("x", DataType::UInt64), ("s", DataType::String)]);
        for &(x, s) in rows {
            block.set_value(0, Value::UInt64(x)).unwrap();
            block.set_value(1, Value::String(s.to_string())).unwrap();
            block.append_row().unwrap();
        }
        block
    }

    fn connected(script: Vec<u8>, config: ClientConfig) -> ProtocolClient<MemoryStream> {
        let mut client = ProtocolClient::new(MemoryStream::new(script), config);
        client.handshake().unwrap();
        client
    }

    fn request_bytes(requests: &[Request<'_>], compression: Option<CompressionMethod>) -> Vec<u8> {
        let mut transport =
            Transport::new(MemoryStream::new(Vec::new())).with_compression(compression);
        for request in requests {
            request.write_to(&mut transport, CLIENT_REVISION).unwrap();
        }
        transport.flush().unwrap();
        transport.get_ref().written().to_vec()
    }

    #[test]
    fn handshake_negotiates_the_lower_revision() {
        let mut script = Vec::new();
        server_hello(&mut script, 54460);
        let config = ClientConfig::default();
        let mut client = ProtocolClient::new(MemoryStream::new(script), config.clone());
        assert_eq!(client.state(), ClientState::Idle);

        let info = client.handshake().unwrap();
        assert_eq!(info.name, "ByteHouse");
        assert_eq!(info.timezone, "Asia/Singapore");
        assert_eq!(info.display_name, "bh-1");
        assert_eq!(info.version_patch, 3);
        assert_eq!(client.revision(), CLIENT_REVISION);
        assert_eq!(client.state(), ClientState::Ready);

        let sent = client.into_inner();
        assert_eq!(sent.written(), request_bytes(&[Request::Hello { config: &config }], None));
    }

    #[test]
    fn old_server_skips_optional_hello_fields() {
        let mut script = Vec::new();
        script.write_varint(0).unwrap();
        script.write_string("old").unwrap();
        script.write_varint(1).unwrap();
        script.write_varint(1).unwrap();
        script.write_varint(54000).unwrap();
        let client = connected(script, ClientConfig::default());
        let info = client.server_info().unwrap();
        assert_eq!(info.display_name, "localhost");
        assert_eq!(info.version_patch, 0);
        assert_eq!(client.revision(), 54000);
    }

    #[test]
    fn query_collects_blocks_and_progress() {
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        server_block(&mut script, 1, &numbers_and_names(&[]), None);
        server_progress(&mut script, 2, 16, 3);
        server_block(&mut script, 1, &numbers_and_names(&[(1, "a"), (2, "b")]), None);
        server_progress(&mut script, 1, 8, 0);
        server_block(&mut script, 1, &numbers_and_names(&[(3, "c")]), None);
        script.write_varint(6).unwrap();
        for field in [3u64, 2, 24] {
            script.write_varint(field).unwrap();
        }
        script.write_bool(false).unwrap();
        script.write_varint(0).unwrap();
        script.write_bool(false).unwrap();
        end_of_stream(&mut script);

        let mut client = connected(script, ClientConfig::default());
        let result = client.query("SELECT x, s FROM t").unwrap();
        assert_eq!(client.state(), ClientState::Ready);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.header.as_ref().unwrap().column_count(), 2);
        assert_eq!(
            result.blocks[1].get_object(0, 1).unwrap(),
            Value::String("c".to_string())
        );
        assert_eq!(result.progress.rows, 3);
        assert_eq!(result.progress.bytes, 24);
        assert_eq!(result.progress.total_rows, 3);
        assert_eq!(result.profile_info.unwrap().blocks, 2);
    }

    #[test]
    fn server_exception_keeps_the_connection_usable() {
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        script.write_varint(2).unwrap();
        script.write_i32(60).unwrap();
        script.write_string("DB::Exception").unwrap();
        script.write_string("Table default.t doesn't exist").unwrap();
        script.write_string("").unwrap();
        script.write_bool(true).unwrap();
        script.write_i32(1000).unwrap();
        script.write_string("Poco::Exception").unwrap();
        script.write_string("inner").unwrap();
        script.write_string("").unwrap();
        script.write_bool(false).unwrap();
        script.write_varint(4).unwrap();

        let mut client = connected(script, ClientConfig::default());
        let err = client.query("SELECT * FROM t").unwrap_err();
        assert_eq!(err.code(), ErrorCode::Server(60));
        let exception = err.as_server_exception().unwrap();
        let codes: Vec<i32> = exception.chain().map(|e| e.code).collect();
        assert_eq!(codes, [60, 1000]);
        assert_eq!(client.state(), ClientState::Ready);

        client.ping().unwrap();
    }

    #[test]
    fn insert_sends_rows_then_an_empty_block() {
        let sample = Block::new([
            ("a", DataType::Int32),
            ("b", DataType::Nullable(Arc::new(DataType::String))),
        ]);
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        script.write_varint(11).unwrap();
        script.write_string("").unwrap();
        script.write_string("columns format version: 1").unwrap();
        server_block(&mut script, 1, &sample, None);
        server_progress(&mut script, 0, 0, 0);
        end_of_stream(&mut script);

        let mut client = connected(script, ClientConfig::default());
        let mut block = client.insert_sample_block("INSERT INTO t VALUES").unwrap();
        assert_eq!(client.state(), ClientState::Inserting);
        block.set_value(0, Value::Int32(7)).unwrap();
        block.set_value(1, Value::Null).unwrap();
        block.append_row().unwrap();
        block.set_value(0, Value::Int32(8)).unwrap();
        block.set_value(1, Value::String("x".to_string())).unwrap();
        block.append_row().unwrap();

        client.send_block(&block).unwrap();
        client.finish_insert().unwrap();
        assert_eq!(client.state(), ClientState::Ready);

        let end = Block::default();
        let expected = request_bytes(
            &[
                Request::Data {
                    table: "",
                    block: &block,
                },
                Request::Data {
                    table: "",
                    block: &end,
                },
            ],
            None,
        );
        assert!(client.into_inner().written().ends_with(&expected));
    }

    #[test]
    fn compressed_session_frames_data_blocks() {
        let method = CompressionMethod::Lz4;
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        server_block(&mut script, 1, &numbers_and_names(&[(1, "a")]), Some(method));
        end_of_stream(&mut script);

        let config = ClientConfig::default().with_compression(Some(method));
        let mut client = connected(script, config);
        let result = client.query("SELECT 1").unwrap();
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.blocks[0].get_object(0, 0).unwrap(), Value::UInt64(1));

        let end = Block::default();
        let expected = request_bytes(
            &[Request::Data {
                table: "",
                block: &end,
            }],
            Some(method),
        );
        assert!(client.into_inner().written().ends_with(&expected));
    }

    #[test]
    fn log_blocks_stay_uncompressed_between_compressed_data() {
        let method = CompressionMethod::Lz4;
        let mut log = Block::new([("text", DataType::String)]);
        log.set_value(0, Value::from("query started")).unwrap();
        log.append_row().unwrap();

        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        server_block(&mut script, 1, &numbers_and_names(&[(1, "a")]), Some(method));
        server_block(&mut script, 10, &log, None);
        server_block(&mut script, 1, &numbers_and_names(&[(2, "b")]), Some(method));
        end_of_stream(&mut script);

        let config = ClientConfig::default().with_compression(Some(method));
        let mut client = connected(script, config);
        client.send_query("SELECT x, s FROM t").unwrap();

        let mut data = Vec::new();
        let mut logs = Vec::new();
        loop {
            match client.next_response().unwrap() {
                ServerResponse::Data { block, .. } => data.push(block),
                ServerResponse::Log { block, .. } => logs.push(block),
                ServerResponse::EndOfStream => break,
                other => panic!("unexpected {}", other.packet()),
            }
        }
        assert_eq!(client.state(), ClientState::Ready);
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].get_object(0, 0).unwrap(),
            Value::String("query started".to_string())
        );
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].get_object(0, 0).unwrap(), Value::UInt64(1));
        assert_eq!(data[1].get_object(0, 0).unwrap(), Value::UInt64(2));
        assert_eq!(
            data[1].get_object(0, 1).unwrap(),
            Value::String("b".to_string())
        );
    }

    #[rstest]
    #[case::truncated_block(vec![1, 0, 1, 2])]
    #[case::unknown_packet(vec![99])]
    #[case::tables_status(vec![9])]
    fn broken_streams_are_fatal(#[case] response: Vec<u8>) {
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        script.extend_from_slice(&response);

        let mut client = connected(script, ClientConfig::default());
        client.send_query("SELECT 1").unwrap();
        assert!(client.next_response().is_err());
        assert_eq!(client.state(), ClientState::Broken);
        assert_eq!(
            client.send_query("SELECT 1").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
    }

    #[test]
    fn requests_out_of_order_are_rejected() {
        let mut client = ProtocolClient::new(MemoryStream::default(), ClientConfig::default());
        assert_eq!(
            client.send_query("SELECT 1").unwrap_err().code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(client.state(), ClientState::Idle);
        assert!(client.next_response().is_err());
        assert!(client.send_block(&Block::default()).is_err());
        assert!(client.into_inner().written().is_empty());
    }

    #[test]
    fn inline_block_follows_the_query() {
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        let mut client = connected(script, ClientConfig::default());

        let params = numbers_and_names(&[(42, "p")]);
        client
            .send_query_with("q-1", "SELECT x, s FROM t WHERE x = ?", QueryStage::Complete, &params)
            .unwrap();
        assert_eq!(client.state(), ClientState::Streaming);

        let expected = request_bytes(
            &[Request::Data {
                table: "",
                block: &params,
            }],
            None,
        );
        assert!(client.into_inner().written().ends_with(&expected));
    }

    #[test]
    fn cancel_then_drain() {
        let mut script = Vec::new();
        server_hello(&mut script, CLIENT_REVISION);
        server_progress(&mut script, 5, 40, 100);
        end_of_stream(&mut script);

        let mut client = connected(script, ClientConfig::default());
        client.send_query("SELECT * FROM numbers(100)").unwrap();
        client.cancel().unwrap();
        while client.state() == ClientState::Streaming {
            client.next_response().unwrap();
        }
        assert_eq!(client.progress().rows, 5);
        assert!(client.into_inner().written().ends_with(&[3]));
    }
}
