//! A minimal standalone-primary fake server, speaking just enough of the
//! legacy wire protocol to drive the handful of operations this core
//! exercises without a live cluster: `ismaster`, `getLastError`, `drop`,
//! a plain query, and `getMore`.
//!
//! This file knows nothing about the crate's internal `wire` module — it is
//! a black-box peer speaking the same bytes over the socket, the same way a
//! real `mongod` would.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bson::{doc, Document};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

const OP_REPLY: i32 = 1;
const OP_UPDATE: i32 = 2001;
const OP_INSERT: i32 = 2002;
const OP_QUERY: i32 = 2004;
const OP_GET_MORE: i32 = 2005;
const OP_DELETE: i32 = 2006;
const OP_KILL_CURSORS: i32 = 2007;

/// A running fake server. Dropping it stops the accept loop; in-flight
/// connection handler threads notice the closed socket and exit on their
/// own.
pub struct FakeServer {
    pub address: String,
    stop: Arc<AtomicBool>,
}

impl FakeServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server listener");
        listener.set_nonblocking(true).expect("set listener nonblocking");
        let address = listener.local_addr().expect("local addr").to_string();

        let stop = Arc::new(AtomicBool::new(false));
        let accept_stop = stop.clone();

        thread::spawn(move || {
            while !accept_stop.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        thread::spawn(move || serve(stream));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        FakeServer { address, stop }
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

struct Header {
    length: i32,
    request_id: i32,
    op_code: i32,
}

fn read_header(stream: &mut TcpStream) -> std::io::Result<Header> {
    let length = stream.read_i32::<LittleEndian>()?;
    let request_id = stream.read_i32::<LittleEndian>()?;
    let _response_to = stream.read_i32::<LittleEndian>()?;
    let op_code = stream.read_i32::<LittleEndian>()?;
    Ok(Header {
        length,
        request_id,
        op_code,
    })
}

fn read_cstring(cursor: &mut std::io::Cursor<&[u8]>) -> String {
    let mut bytes = Vec::new();
    loop {
        let b = cursor.read_u8().expect("cstring truncated");
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn write_reply(stream: &mut TcpStream, request_id: i32, response_to: i32, documents: &[Document]) -> std::io::Result<()> {
    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(0)?; // responseFlags
    body.write_i64::<LittleEndian>(0)?; // cursorId: every canned reply here is exhausted immediately
    body.write_i32::<LittleEndian>(0)?; // startingFrom
    body.write_i32::<LittleEndian>(documents.len() as i32)?;
    for doc in documents {
        doc.to_writer(&mut body).expect("encode reply document");
    }

    stream.write_i32::<LittleEndian>(16 + body.len() as i32)?;
    stream.write_i32::<LittleEndian>(request_id)?;
    stream.write_i32::<LittleEndian>(response_to)?;
    stream.write_i32::<LittleEndian>(OP_REPLY)?;
    stream.write_all(&body)?;
    stream.flush()
}

/// Picks a canned reply document for one `OP_QUERY`, based on the
/// collection it targeted and (for `$cmd` queries) which command was sent.
fn canned_reply(full_collection_name: &str, query: &Document) -> Document {
    if full_collection_name.ends_with(".$cmd") {
        if query.get("ismaster").is_some() {
            return doc! {
                "ismaster": true,
                "maxBsonObjectSize": 16_777_216i64,
                "maxMessageSizeBytes": 48_000_000i32,
                "maxWriteBatchSize": 1000i64,
                "minWireVersion": 0i32,
                "maxWireVersion": 6i32,
                "ok": 1.0,
            };
        }
        if query.get("getLastError").is_some() {
            return doc! { "ok": 1.0, "n": 1i32 };
        }
        if query.get("drop").is_some() {
            return doc! { "ok": 0.0, "errmsg": "ns not found" };
        }
        return doc! { "ok": 1.0 };
    }

    doc! { "_id": 1i32, "name": "widget" }
}

fn serve(mut stream: TcpStream) {
    stream.set_nodelay(true).ok();
    let mut next_reply_id = 1i32;

    loop {
        let header = match read_header(&mut stream) {
            Ok(h) => h,
            Err(_) => return,
        };

        let body_len = (header.length - 16).max(0) as usize;
        let mut body = vec![0u8; body_len];
        if stream.read_exact(&mut body).is_err() {
            return;
        }

        match header.op_code {
            OP_QUERY => {
                let mut cursor = std::io::Cursor::new(&body[..]);
                let _flags = cursor.read_i32::<LittleEndian>().expect("query flags");
                let full_collection_name = read_cstring(&mut cursor);
                let _number_to_skip = cursor.read_i32::<LittleEndian>().expect("numberToSkip");
                let _number_to_return = cursor.read_i32::<LittleEndian>().expect("numberToReturn");
                let query = Document::from_reader(&mut cursor).unwrap_or_default();

                let reply_doc = canned_reply(&full_collection_name, &query);
                if write_reply(&mut stream, next_reply_id, header.request_id, &[reply_doc]).is_err() {
                    return;
                }
                next_reply_id += 1;
            }
            OP_GET_MORE => {
                if write_reply(&mut stream, next_reply_id, header.request_id, &[]).is_err() {
                    return;
                }
                next_reply_id += 1;
            }
            // OP_INSERT/OP_UPDATE/OP_DELETE/OP_KILL_CURSORS carry no reply in
            // the legacy protocol; just consume the frame and keep serving.
            OP_INSERT | OP_UPDATE | OP_DELETE | OP_KILL_CURSORS => {}
            _ => return,
        }
    }
}
