//! Minimal two-protocol server: ECHO and everything else falls to DISCARD.
//!
//! Grounded on `examples/simple.go` in the original source. Run with
//! `cargo run --example simple`, then from another terminal:
//! `printf 'ECHOhello\n' | nc localhost 7000`.

use std::sync::Arc;

use async_trait::async_trait;
use promux::{BoxedStream, Config, Hint, Matcher, Probe, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Echo;

#[async_trait]
impl Matcher for Echo {
    fn describe(&self) -> &str {
        "echo"
    }

    fn probe(&self, header: &[u8], _hints: &[Arc<dyn Hint>]) -> Probe {
        const MARKER: &[u8] = b"ECHO";
        if header.len() < MARKER.len() {
            return Probe::undecided(MARKER.len());
        }
        if &header[..MARKER.len()] == MARKER {
            Probe::matched()
        } else {
            Probe::reject()
        }
    }

    async fn handle(
        &self,
        mut stream: BoxedStream,
    ) -> Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>> {
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            stream.write_all(&buf[..n]).await?;
        }
    }
}

struct Discard;

#[async_trait]
impl Matcher for Discard {
    fn describe(&self) -> &str {
        "discard"
    }

    fn probe(&self, _header: &[u8], _hints: &[Arc<dyn Hint>]) -> Probe {
        Probe::matched()
    }

    async fn handle(
        &self,
        mut stream: BoxedStream,
    ) -> Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>> {
        let mut sink = tokio::io::sink();
        tokio::io::copy(&mut stream, &mut sink).await?;
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> promux::Result<()> {
    env_logger::init();

    let mut server = Server::with_config(
        Config::new()
            .with_default_logger()
            .with_default_protocol(Arc::new(Discard)),
    );
    server.add_matcher(Arc::new(Echo));
    let server = Arc::new(server);

    let listener = Arc::new(tokio::net::TcpListener::bind("127.0.0.1:7000").await?);
    log::info!("listening on 127.0.0.1:7000");
    server.serve(listener).await
}
