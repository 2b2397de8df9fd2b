//! TCP front-end.
//!
//! A thin translator between the wire protocol and engine operations:
//! each connection selects a database, then streams commands one at a
//! time. The payload is read before the catalog lock is taken and the
//! lock is released before the response is written, so the lock is never
//! held across I/O; holding it for the engine call is what serializes
//! writers per database.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::catalog::Catalog;
use crate::engine::Database;
use crate::protocol::{
    decode_vector, RequestHeader, ACK_FAIL, ACK_OK, CMD_DELETE, CMD_INSERT, CMD_INSERT_AUTO,
    CMD_SEARCH, CMD_SEARCH_N, CMD_SELECT_DB, CMD_UPDATE, MAX_NAME_LEN, REQUEST_HEADER_LEN,
};

/// Catalog shared by every connection.
pub type SharedCatalog = Arc<Mutex<Catalog>>;

pub fn shared_catalog(catalog: Catalog) -> SharedCatalog {
    Arc::new(Mutex::new(catalog))
}

/// Accept loop. Runs until the listener fails.
pub async fn run(listener: TcpListener, catalog: SharedCatalog) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("client connected: {}", peer);
        let catalog = Arc::clone(&catalog);
        tokio::spawn(async move {
            match handle_client(stream, catalog).await {
                Ok(()) => tracing::debug!("client disconnected: {}", peer),
                Err(err) => tracing::debug!("connection {} dropped: {}", peer, err),
            }
        });
    }
}

/// Database selected by this connection, with its dimension cached for
/// payload sizing.
struct Session {
    name: String,
    dim: usize,
}

async fn handle_client(mut stream: TcpStream, catalog: SharedCatalog) -> std::io::Result<()> {
    let mut session: Option<Session> = None;
    let mut header_buf = [0u8; REQUEST_HEADER_LEN];

    loop {
        match stream.read_exact(&mut header_buf).await {
            Ok(_) => {}
            // EOF between requests is a normal hangup.
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }
        let header = RequestHeader::decode(&header_buf);

        if header.cmd == CMD_SELECT_DB {
            if let Some(new_session) = select_db(&mut stream, &catalog, header.meta).await? {
                session = Some(new_session);
            }
            // SELECT_DB always acks '1'; open failures are logged
            // server-side and keep the previous selection.
            stream.write_all(&[ACK_OK]).await?;
            continue;
        }

        // Every other command requires the handshake first.
        let Some(active) = session.as_ref() else {
            tracing::warn!("command {} before SELECT_DB, closing", header.cmd);
            return Ok(());
        };

        let Some(response) = dispatch(&mut stream, &catalog, active, header).await? else {
            return Ok(());
        };
        stream.write_all(&response).await?;
    }
}

/// Handshake: read the name and requested dimension, open through the
/// catalog. `None` means the database could not be opened; the payload
/// is fully consumed either way, so the stream stays in sync.
async fn select_db(
    stream: &mut TcpStream,
    catalog: &SharedCatalog,
    name_len: u32,
) -> std::io::Result<Option<Session>> {
    let name_len = name_len as usize;
    if name_len == 0 || name_len > MAX_NAME_LEN {
        // Cannot safely consume the payload; force a reconnect.
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("database name length {} out of range", name_len),
        ));
    }

    let mut name_buf = vec![0u8; name_len];
    stream.read_exact(&mut name_buf).await?;
    let mut dim_buf = [0u8; 4];
    stream.read_exact(&mut dim_buf).await?;
    let dim = u32::from_le_bytes(dim_buf) as usize;

    let Ok(name) = String::from_utf8(name_buf) else {
        tracing::warn!("SELECT_DB with non-UTF8 name");
        return Ok(None);
    };

    let mut cat = catalog.lock();
    match cat.select(&name, dim) {
        Ok(db) => {
            let dim = db.dim();
            Ok(Some(Session { name, dim }))
        }
        Err(err) => {
            tracing::warn!("SELECT_DB {:?} (dim {}) failed: {}", name, dim, err);
            Ok(None)
        }
    }
}

/// Executes one post-handshake command and returns the response bytes.
/// `None` closes the connection (unknown opcode).
async fn dispatch(
    stream: &mut TcpStream,
    catalog: &SharedCatalog,
    session: &Session,
    header: RequestHeader,
) -> std::io::Result<Option<Vec<u8>>> {
    if header.cmd == CMD_DELETE {
        let mut cat = catalog.lock();
        let response = match cat.get_mut(&session.name) {
            Some(db) => match db.remove(header.meta as u64) {
                Ok(removed) => vec![ack(removed)],
                Err(err) => {
                    tracing::warn!("DELETE {} on {}: {}", header.meta, session.name, err);
                    vec![ACK_FAIL]
                }
            },
            None => vec![ACK_FAIL],
        };
        return Ok(Some(response));
    }

    let reads_vector = matches!(
        header.cmd,
        CMD_INSERT | CMD_SEARCH | CMD_UPDATE | CMD_INSERT_AUTO | CMD_SEARCH_N
    );
    if !reads_vector {
        tracing::warn!("unknown command {}, closing", header.cmd);
        return Ok(None);
    }

    let mut payload = vec![0u8; session.dim * std::mem::size_of::<f32>()];
    stream.read_exact(&mut payload).await?;
    let vector = decode_vector(&payload);

    let mut cat = catalog.lock();
    let Some(db) = cat.get_mut(&session.name) else {
        return Ok(Some(vec![ACK_FAIL]));
    };
    Ok(Some(execute_vector_command(db, session, header, &vector)))
}

fn execute_vector_command(
    db: &mut Database,
    session: &Session,
    header: RequestHeader,
    vector: &[f32],
) -> Vec<u8> {
    match header.cmd {
        CMD_INSERT => match db.insert(header.meta as u64, vector) {
            Ok(()) => vec![ACK_OK],
            Err(err) => {
                tracing::warn!("INSERT {} on {}: {}", header.meta, session.name, err);
                vec![ACK_FAIL]
            }
        },
        CMD_SEARCH => {
            let id = match db.search(vector) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!("SEARCH on {}: {}", session.name, err);
                    -1
                }
            };
            id.to_le_bytes().to_vec()
        }
        CMD_UPDATE => {
            let updated = match db.update(header.meta as u64, vector) {
                Ok(updated) => updated,
                Err(err) => {
                    tracing::warn!("UPDATE {} on {}: {}", header.meta, session.name, err);
                    false
                }
            };
            vec![ack(updated)]
        }
        CMD_INSERT_AUTO => {
            // Auto ids start at 1, so 0 unambiguously signals failure.
            let id = match db.insert_auto(vector) {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!("INSERT_AUTO on {}: {}", session.name, err);
                    0
                }
            };
            id.to_le_bytes().to_vec()
        }
        CMD_SEARCH_N => {
            let keys = match db.search_n(vector, header.meta as usize) {
                Ok(keys) => keys,
                Err(err) => {
                    tracing::warn!("SEARCH_N on {}: {}", session.name, err);
                    Vec::new()
                }
            };
            let mut out = Vec::with_capacity(4 + keys.len() * 4);
            out.extend_from_slice(&(keys.len() as u32).to_le_bytes());
            for key in keys {
                out.extend_from_slice(&key.to_le_bytes());
            }
            out
        }
        _ => unreachable!("dispatch filters opcodes"),
    }
}

fn ack(ok: bool) -> u8 {
    if ok {
        ACK_OK
    } else {
        ACK_FAIL
    }
}
