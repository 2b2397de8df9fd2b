//! Wire-protocol round-trips against a live listener.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use flatvec_db::catalog::Catalog;
use flatvec_db::protocol::{
    encode_vector, RequestHeader, ACK_FAIL, ACK_OK, CMD_DELETE, CMD_INSERT, CMD_INSERT_AUTO,
    CMD_SEARCH, CMD_SEARCH_N, CMD_SELECT_DB, CMD_UPDATE,
};
use flatvec_db::server;

async fn start_server(data_dir: &Path) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let catalog = server::shared_catalog(Catalog::new(data_dir, 1000));
    tokio::spawn(server::run(listener, catalog));
    addr
}

async fn select_db(stream: &mut TcpStream, name: &str, dim: u32) -> u8 {
    let header = RequestHeader {
        cmd: CMD_SELECT_DB,
        meta: name.len() as u32,
    };
    stream.write_all(&header.encode()).await.unwrap();
    stream.write_all(name.as_bytes()).await.unwrap();
    stream.write_all(&dim.to_le_bytes()).await.unwrap();
    read_byte(stream).await
}

async fn send_vector(stream: &mut TcpStream, cmd: u8, meta: u32, vector: &[f32]) {
    let header = RequestHeader { cmd, meta };
    stream.write_all(&header.encode()).await.unwrap();
    stream.write_all(&encode_vector(vector)).await.unwrap();
}

async fn read_byte(stream: &mut TcpStream) -> u8 {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await.unwrap();
    buf[0]
}

async fn read_i32(stream: &mut TcpStream) -> i32 {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    i32::from_le_bytes(buf)
}

async fn read_u32(stream: &mut TcpStream) -> u32 {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    u32::from_le_bytes(buf)
}

async fn read_u64(stream: &mut TcpStream) -> u64 {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).await.unwrap();
    u64::from_le_bytes(buf)
}

#[tokio::test]
async fn insert_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "vectors", 3).await, ACK_OK);

    send_vector(&mut stream, CMD_INSERT, 1, &[1.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 2, &[0.0, 1.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    send_vector(&mut stream, CMD_SEARCH, 0, &[0.9, 0.1, 0.0]).await;
    assert_eq!(read_i32(&mut stream).await, 1);
}

#[tokio::test]
async fn search_on_empty_database_is_minus_one() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "empty", 3).await, ACK_OK);
    send_vector(&mut stream, CMD_SEARCH, 0, &[0.0, 0.0, 0.0]).await;
    assert_eq!(read_i32(&mut stream).await, -1);
}

#[tokio::test]
async fn delete_acks_and_hides_rows() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "deletions", 3).await, ACK_OK);

    send_vector(&mut stream, CMD_INSERT, 10, &[1.0, 1.0, 1.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 99, &[50.0, 50.0, 50.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    let delete = RequestHeader {
        cmd: CMD_DELETE,
        meta: 10,
    };
    stream.write_all(&delete.encode()).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    // Second delete of the same key fails.
    stream.write_all(&delete.encode()).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, ACK_FAIL);

    send_vector(&mut stream, CMD_SEARCH, 0, &[1.1, 1.1, 1.1]).await;
    assert_eq!(read_i32(&mut stream).await, 99);
}

#[tokio::test]
async fn update_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "updates", 3).await, ACK_OK);

    send_vector(&mut stream, CMD_INSERT, 42, &[1.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    send_vector(&mut stream, CMD_UPDATE, 42, &[0.0, 1.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    // Unknown key cannot be updated.
    send_vector(&mut stream, CMD_UPDATE, 77, &[0.0, 0.0, 9.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_FAIL);

    send_vector(&mut stream, CMD_SEARCH, 0, &[0.0, 0.9, 0.1]).await;
    assert_eq!(read_i32(&mut stream).await, 42);
}

#[tokio::test]
async fn auto_insert_returns_sequential_ids() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "auto", 3).await, ACK_OK);

    send_vector(&mut stream, CMD_INSERT_AUTO, 0, &[1.0, 0.0, 0.0]).await;
    assert_eq!(read_u64(&mut stream).await, 1);
    send_vector(&mut stream, CMD_INSERT_AUTO, 0, &[0.0, 1.0, 0.0]).await;
    assert_eq!(read_u64(&mut stream).await, 2);
}

#[tokio::test]
async fn search_n_frames_count_then_keys() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "topn", 3).await, ACK_OK);

    send_vector(&mut stream, CMD_INSERT, 10, &[1.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 20, &[2.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 30, &[3.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    let delete = RequestHeader {
        cmd: CMD_DELETE,
        meta: 20,
    };
    stream.write_all(&delete.encode()).await.unwrap();
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    send_vector(&mut stream, CMD_SEARCH_N, 2, &[0.0, 0.0, 0.0]).await;
    assert_eq!(read_u32(&mut stream).await, 2);
    assert_eq!(read_i32(&mut stream).await, 10);
    assert_eq!(read_i32(&mut stream).await, 30);
}

#[tokio::test]
async fn command_before_handshake_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let header = RequestHeader {
        cmd: CMD_SEARCH,
        meta: 0,
    };
    stream.write_all(&header.encode()).await.unwrap();

    let mut buf = [0u8; 1];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "server should hang up without a response");
}

#[tokio::test]
async fn handshake_always_acks() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // A name the catalog refuses to map to a file still acks '1'; the
    // failure is server-side only and no file is created.
    assert_eq!(select_db(&mut stream, "bad.name", 3).await, ACK_OK);
    assert!(!dir.path().join("bad.name.db").exists());

    // The same connection can go on to select a real database.
    assert_eq!(select_db(&mut stream, "good_name", 3).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 1, &[0.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);
}

#[tokio::test]
async fn reselect_with_other_dimension_serves_stored_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    assert_eq!(select_db(&mut stream, "fixed", 3).await, ACK_OK);
    send_vector(&mut stream, CMD_INSERT, 1, &[1.0, 0.0, 0.0]).await;
    assert_eq!(read_byte(&mut stream).await, ACK_OK);

    // Mismatched re-select acks and the stored dimension stays in
    // force for payload sizing.
    assert_eq!(select_db(&mut stream, "fixed", 4).await, ACK_OK);
    send_vector(&mut stream, CMD_SEARCH, 0, &[0.9, 0.1, 0.0]).await;
    assert_eq!(read_i32(&mut stream).await, 1);
}

#[tokio::test]
async fn databases_persist_across_server_restarts() {
    let dir = tempfile::tempdir().unwrap();

    {
        let addr = start_server(dir.path()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        assert_eq!(select_db(&mut stream, "durable", 3).await, ACK_OK);
        send_vector(&mut stream, CMD_INSERT, 50, &[0.5, 0.5, 0.5]).await;
        assert_eq!(read_byte(&mut stream).await, ACK_OK);
    }

    // Fresh listener, fresh catalog, same data directory.
    let addr = start_server(dir.path()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();
    assert_eq!(select_db(&mut stream, "durable", 3).await, ACK_OK);
    send_vector(&mut stream, CMD_SEARCH, 0, &[0.5, 0.5, 0.5]).await;
    assert_eq!(read_i32(&mut stream).await, 50);
}
