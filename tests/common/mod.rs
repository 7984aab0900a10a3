use log::{debug, LevelFilter};
use log4rs_test_utils::test_logging::init_logging_once_for;
use moray::server::MorayServer;
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::{sleep, Duration},
};
use utils::assertions::assert_eq_vectors;

pub fn init_logging() {
    init_logging_once_for(None, LevelFilter::Debug, "{h({({l}):5.5})} [{M}] {f}:{L}: {m}{n}");
}

pub fn next_available_address() -> SocketAddr {
    static PORT: AtomicUsize = AtomicUsize::new(32000);

    format!("127.0.0.1:{}", PORT.fetch_add(1, Ordering::AcqRel)).parse().unwrap()
}

/// Spawns the proxy on `addr` and returns once it accepts connections.
/// Abort the returned handle to shut the proxy down.
pub async fn spawn_proxy(addr: SocketAddr) -> JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let server = MorayServer::new(addr);
        if let Err(err) = server.run().await {
            panic!("[Spawned proxy] finished with error: {err}");
        }
    });

    wait_until_listening(addr).await;
    handle
}

/// Spawns a TCP echo server on `addr`. Every accepted connection echoes
/// until EOF. Abort the returned handle to shut the server down.
pub async fn spawn_tcp_echo_server(addr: SocketAddr) -> JoinHandle<()> {
    let listener = TcpListener::bind(addr)
        .await
        .expect("[Spawned TCP Echo Server] Failed to bind TCP listener");
    debug!("[Spawned TCP Echo Server] Started. Listening on {}", addr);

    tokio::spawn(async move {
        loop {
            let (mut stream, peer) = listener
                .accept()
                .await
                .expect("[Spawned TCP Echo Server] Failed to accept TCP connection");
            debug!("[Spawned TCP Echo Server] Accepted new TCP connection: {}", peer);

            tokio::spawn(async move {
                let mut buf = vec![0u8; 1024];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) => {
                            debug!("[Spawned TCP Echo Server] Received EOF from {}", peer);
                            break;
                        }
                        Ok(n) => {
                            debug!("[Spawned TCP Echo Server] Echoing {} bytes to {}", n, peer);
                            stream.write_all(&buf[..n]).await.expect("echo write should succeed");
                        }
                        Err(err) => {
                            debug!("[Spawned TCP Echo Server] Read error from {}: {}", peer, err);
                            break;
                        }
                    }
                }
            });
        }
    })
}

async fn wait_until_listening(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Listener on {addr} did not come up");
}

/// Establish connection with passed `endpoint` through `socks5_proxy`. Then send
/// data and expect it to be fully returned by the endpoint.
pub async fn ping_pong_data_through_socks5(endpoint: SocketAddr, socks5_proxy: SocketAddr) {
    // Create TCP stream.
    let mut socks5_stream = TcpStream::connect(socks5_proxy)
        .await
        .expect("Expect successful TCP connection established with proxy");

    // Establish SOCKS5 connection over TCP stream.
    async_socks5::connect(&mut socks5_stream, endpoint, None)
        .await
        .expect("Expect successfully established SOCKS5 connection");

    // Write generated buffer.
    let write_buff = utils::generate_data(1024);
    socks5_stream.write_all(&write_buff).await.expect("Expect all data to be written");

    // Expect it to be fully received back.
    let mut read_buff = vec![0u8; 1024];
    socks5_stream.read_exact(&mut read_buff).await.expect("Expect all data to be read");

    // Shutdown write direction.
    socks5_stream.shutdown().await.expect("Expect successful TCP stream shutdown");

    // Check that written and read data are equal.
    assert_eq_vectors(&write_buff, &read_buff);
}

pub mod utils {

    use rand::Rng;

    pub mod assertions {

        use std::fmt::Debug;

        pub fn assert_eq_vectors<T: Eq + Debug>(expected: &[T], actual: &[T]) {
            let matching = expected
                .iter()
                .zip(actual)
                .filter(|&(r, w)| {
                    assert_eq!(r, w);
                    r == w
                })
                .count();

            assert_eq!(expected.len(), matching, "whole buffers (write & read) should be equal");
        }
    }

    pub fn generate_data(len: usize) -> Vec<u8> {
        let v = vec![0u8; len];
        let mut rng = rand::thread_rng();

        v.iter().map(|_| rng.gen::<u8>()).collect()
    }
}
