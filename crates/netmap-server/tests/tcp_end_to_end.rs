// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! Full server over loopback TCP: accept loop, connection tasks, engine and
//! SQLite persistence on shutdown.

use netmap_server::protocol::{Command, Frame, FrameBuilder};
use netmap_server::{MapServer, MapStore, ServerConfig, SqliteStore};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        Self { stream }
    }

    async fn send(&mut self, command: Command, build: impl FnOnce(&mut FrameBuilder)) {
        let mut b = FrameBuilder::new(command);
        build(&mut b);
        self.stream.write_all(b.finish().as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Frame {
        timeout(IO_TIMEOUT, async {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await.unwrap();
            let len = u32::from_be_bytes(header) as usize;
            let mut bytes = vec![0u8; len];
            bytes[..4].copy_from_slice(&header);
            self.stream.read_exact(&mut bytes[4..]).await.unwrap();
            Frame::from_bytes(bytes)
        })
        .await
        .expect("timed out waiting for a frame")
    }

    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 16];
        let n = timeout(IO_TIMEOUT, self.stream.read(&mut buf))
            .await
            .expect("timed out waiting for close")
            .unwrap_or(0);
        assert_eq!(n, 0, "expected EOF");
    }
}

async fn start(
    config: ServerConfig,
    store: SqliteStore,
) -> (
    MapServer,
    std::net::SocketAddr,
    tokio::task::JoinHandle<Result<(), netmap_server::ServerError>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = MapServer::new(config).unwrap();
    let srv = server.clone();
    let handle = tokio::spawn(async move { srv.serve(listener, store).await });
    (server, addr, handle)
}

#[tokio::test]
async fn two_editors_share_a_map_and_it_persists() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("netmap.db");
    let store = SqliteStore::open(&db).unwrap();
    store.insert_map(7, "Backbone").unwrap();

    let (server, addr, handle) = start(ServerConfig::default(), store).await;

    let mut a = Client::connect(addr).await;
    let mut b = Client::connect(addr).await;
    a.send(Command::Login, |f| {
        f.put_string("alice").put_string("pw");
    })
    .await;
    b.send(Command::Login, |f| {
        f.put_string("bob").put_string("pw");
    })
    .await;

    a.send(Command::GetMapList, |_| {}).await;
    let list = a.recv().await;
    assert_eq!(list.command(), Some(Command::GetMapList));
    let mut r = list.payload();
    assert_eq!(r.get_u32().unwrap(), 1);
    assert_eq!(r.get_i32().unwrap(), 7);
    assert_eq!(r.get_string().unwrap(), "Backbone");

    for client in [&mut a, &mut b] {
        client
            .send(Command::OpenMap, |f| {
                f.put_i32(7);
            })
            .await;
        let snapshot = client.recv().await;
        assert_eq!(snapshot.command(), Some(Command::OpenMap));
        let mut r = snapshot.payload();
        assert_eq!(r.get_i32().unwrap(), 7);
        assert_eq!(r.get_u32().unwrap(), 0);
        assert_eq!(r.get_u32().unwrap(), 0);
    }

    a.send(Command::AddSymbol, |f| {
        f.put_i32(7).put_i32(-1).put_i32(10).put_i32(20);
    })
    .await;

    let rename = a.recv().await;
    assert_eq!(rename.command(), Some(Command::RenameSymbol));
    let mut r = rename.payload();
    assert_eq!(
        (r.get_i32().unwrap(), r.get_i32().unwrap(), r.get_i32().unwrap()),
        (7, -1, 1)
    );

    let added = b.recv().await;
    assert_eq!(added.command(), Some(Command::AddSymbol));
    let mut r = added.payload();
    assert_eq!(r.get_i32().unwrap(), 7);
    assert_eq!(r.get_i32().unwrap(), 1);
    assert_eq!(r.get_i32().unwrap(), 10);
    assert_eq!(r.get_i32().unwrap(), 20);

    server.shutdown();
    timeout(IO_TIMEOUT, handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(!server.is_running());

    // Engine is gone, so both connections are closed.
    a.expect_closed().await;
    b.expect_closed().await;

    let reopened = SqliteStore::open(&db).unwrap();
    let contents = reopened.load_map(7).unwrap().unwrap();
    assert_eq!(contents.symbols.len(), 1);
    assert_eq!(contents.symbols[0].id, 1);
    assert_eq!((contents.symbols[0].x, contents.symbols[0].y), (10, 20));
}

#[tokio::test]
async fn connections_beyond_the_limit_are_refused() {
    let config = ServerConfig {
        max_sessions: 1,
        ..Default::default()
    };
    let store = SqliteStore::new_in_memory().unwrap();
    let (server, addr, handle) = start(config, store).await;

    let mut first = Client::connect(addr).await;
    first.send(Command::GetMapList, |_| {}).await;
    let list = first.recv().await;
    assert_eq!(list.payload().get_u32().unwrap(), 0);
    assert_eq!(server.session_count(), 1);

    let mut second = Client::connect(addr).await;
    second.expect_closed().await;

    server.shutdown();
    timeout(IO_TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn malformed_length_closes_only_that_session() {
    let store = SqliteStore::new_in_memory().unwrap();
    let (server, addr, handle) = start(ServerConfig::default(), store).await;

    let mut bad = Client::connect(addr).await;
    let mut good = Client::connect(addr).await;

    // Length smaller than the header itself.
    bad.stream
        .write_all(&[0, 0, 0, 4, 0, 0, 0, 2])
        .await
        .unwrap();
    bad.expect_closed().await;

    good.send(Command::GetMapList, |_| {}).await;
    assert_eq!(good.recv().await.command(), Some(Command::GetMapList));

    server.shutdown();
    timeout(IO_TIMEOUT, handle).await.unwrap().unwrap().unwrap();
}
