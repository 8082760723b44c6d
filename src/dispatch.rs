//! The detection dispatcher: the core per-connection algorithm.
//!
//! Grounded on `serve.go`'s `Serve`/`handleConn` pair in the original source,
//! restructured around an explicit `DetectOutcome` so the read/probe/budget
//! steps stay testable in isolation from the handoff and fallback paths.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;

use crate::conn::{HintedStream, PeekStream};
use crate::error::{Error, Result};
use crate::hints::HintList;
use crate::matcher::{Matcher, Verdict};
use crate::sink::Sink;
use crate::stream::BoxedStream;

/// Everything a detection pass needs that doesn't change across recursive
/// re-entries: the canonical matcher list, the read-size floor computed from
/// it, and the server's limits and collaborators.
pub(crate) struct DispatchContext {
    pub matchers: Vec<Arc<dyn Matcher>>,
    pub minimum_read: usize,
    pub bytes_to_check: usize,
    pub default_protocol: Option<Arc<dyn Matcher>>,
    pub logger: Option<Arc<dyn Sink>>,
}

struct DetectOutcome {
    header: Vec<u8>,
    stored_err: Option<io::Error>,
    winner: Option<Arc<dyn Matcher>>,
    greedy: Option<(usize, usize)>,
}

/// Drives one detection pass over `stream`, then either hands off to the
/// winning matcher or falls back, recursing into a returned transport stream
/// as needed. Boxed because an async fn can't call itself directly.
///
/// `recursed` distinguishes the outer, per-accept detection pass from a
/// re-entry on a transport a handler returned (e.g. a TLS handler's
/// decrypted stream): it is `false` for the former and `true` for the
/// latter, and only changes the `"(transport)"` suffix on the "handling
/// connection as <matcher>" log line — the detection algorithm itself is
/// identical on either pass, per §4.E's re-entrancy requirement.
pub(crate) fn dispatch(
    ctx: Arc<DispatchContext>,
    stream: BoxedStream,
    hints: HintList,
    recursed: bool,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        let mut stream = stream;
        let outcome = detect_once(
            &mut stream,
            ctx.matchers.clone(),
            ctx.bytes_to_check,
            ctx.minimum_read,
            &hints,
            ctx.logger.as_ref(),
        )
        .await;

        if let Some(matcher) = outcome.winner {
            if let Some(logger) = &ctx.logger {
                let suffix = if recursed { " (transport)" } else { "" };
                logger.info(&format!(
                    "handling connection as {}{suffix}",
                    matcher.describe()
                ));
            }
            let peeked: BoxedStream = Box::new(HintedStream::new(
                PeekStream::new(stream, outcome.header, outcome.stored_err),
                hints.clone(),
            ));
            return invoke_handler(ctx, matcher, peeked, hints).await;
        }

        fallback(
            ctx,
            stream,
            outcome.header,
            outcome.stored_err,
            outcome.greedy,
            hints,
        )
        .await
    })
}

/// Runs the read/probe/budget loop (§4.E steps 1-4) to a conclusion: either a
/// winning matcher, or a terminal outcome (empty candidates, greedy
/// survivors, or a read failure) for [`fallback`] to handle.
///
/// Each iteration reads exactly up to the current `target` (never more, per
/// the target-driven variant `SPEC_FULL.md`'s Open Question adopts), probes
/// every surviving candidate against the grown header, drops matchers that
/// are definitively rejected or malformed (`needed <= header.len()` without
/// matching), and recomputes `target` from the smallest `needed` among the
/// survivors. The loop always terminates: every iteration either shrinks
/// `candidates` or grows `header` toward `bytes_to_check`.
async fn detect_once(
    stream: &mut BoxedStream,
    mut candidates: Vec<Arc<dyn Matcher>>,
    bytes_to_check: usize,
    minimum_read: usize,
    hints: &HintList,
    logger: Option<&Arc<dyn Sink>>,
) -> DetectOutcome {
    let mut header = BytesMut::with_capacity(bytes_to_check.min(4096));
    let mut target = minimum_read;

    loop {
        if candidates.is_empty() {
            return DetectOutcome {
                header: header.to_vec(),
                stored_err: None,
                winner: None,
                greedy: None,
            };
        }
        if target > bytes_to_check {
            return DetectOutcome {
                header: header.to_vec(),
                stored_err: None,
                winner: None,
                greedy: Some((target, bytes_to_check)),
            };
        }

        while header.len() < target {
            let mut chunk = vec![0u8; target - header.len()];
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    let err = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed during protocol detection",
                    );
                    return DetectOutcome {
                        header: header.to_vec(),
                        stored_err: Some(err),
                        winner: None,
                        greedy: None,
                    };
                }
                Ok(n) => header.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    return DetectOutcome {
                        header: header.to_vec(),
                        stored_err: Some(e),
                        winner: None,
                        greedy: None,
                    };
                }
            }
        }

        let mut next_target = usize::MAX;
        let mut winner = None;
        let mut retained = Vec::with_capacity(candidates.len());
        for matcher in candidates.drain(..) {
            if winner.is_some() {
                retained.push(matcher);
                continue;
            }
            let probe = matcher.probe(&header, hints);
            if probe.verdict == Verdict::Match {
                winner = Some(matcher);
            } else if probe.needed == 0 {
                // Definitive reject (or a match already claimed): eliminated for good.
            } else if probe.needed <= header.len() {
                if let Some(logger) = logger {
                    logger.warn(&format!(
                        "handler {} requesting {} bytes, already read {} — skipping",
                        matcher.describe(),
                        probe.needed,
                        header.len()
                    ));
                }
            } else {
                next_target = next_target.min(probe.needed);
                retained.push(matcher);
            }
        }
        candidates = retained;

        if let Some(matcher) = winner {
            return DetectOutcome {
                header: header.to_vec(),
                stored_err: None,
                winner: Some(matcher),
                greedy: None,
            };
        }

        target = next_target;
    }
}

/// Hands ownership of `stream` to `matcher` and interprets the result per
/// §7's "Handler failure" entry and §4.E's Handoff/recursive re-entry rules.
///
/// - `Ok(Some(transport))`: the matcher unwrapped a tunnel (TLS decrypting
///   into cleartext, say) and wants the dispatcher to re-run detection on
///   what it unwrapped. Hints carry forward per §4.B: if `transport` exposes
///   its own hint list, that list replaces `hints` for the recursive pass;
///   otherwise the current `hints` are inherited unchanged. The recursive
///   [`dispatch`] call is always made with `recursed = true`, since by
///   construction this is never the outer per-accept pass.
/// - `Ok(None)`: the matcher took full ownership; there's nothing left for
///   the dispatcher to do.
/// - `Err(source)`: the matcher's `handle` failed. Logged with both the
///   matcher's label and the underlying error, then wrapped in
///   [`Error::Handler`] and returned — the dispatcher does not retry or fall
///   back, since ownership of the connection has already transferred.
async fn invoke_handler(
    ctx: Arc<DispatchContext>,
    matcher: Arc<dyn Matcher>,
    stream: BoxedStream,
    hints: HintList,
) -> Result<()> {
    match matcher.handle(stream).await {
        Ok(Some(transport)) => {
            let next_hints = transport
                .hints()
                .map(|h| h.to_vec())
                .unwrap_or(hints);
            dispatch(ctx, transport, next_hints, true).await
        }
        Ok(None) => Ok(()),
        Err(source) => {
            if let Some(logger) = &ctx.logger {
                logger.error(&format!("handling {} failed: {source}", matcher.describe()));
            }
            Err(Error::Handler {
                matcher: matcher.describe().to_string(),
                source,
            })
        }
    }
}

/// Runs when [`detect_once`] breaks without a winner: a read failure, a
/// greedy-survivor budget overrun, or an empty candidate set per §7.
///
/// If a `DefaultProtocol` matcher is configured (§4.F), it receives a
/// peek-buffered wrapper carrying everything read so far (and any deferred
/// read error) exactly as a winning matcher would via [`invoke_handler`] —
/// including the same recursive re-entry on a returned transport stream.
/// Otherwise the failure is logged and mapped to the caller-visible error:
/// the terminal read error if one occurred, [`Error::GreedyHandler`] if
/// survivors collectively demanded more than `bytes_to_check`, or
/// [`Error::NoMatch`] if every matcher simply eliminated itself.
async fn fallback(
    ctx: Arc<DispatchContext>,
    stream: BoxedStream,
    header: Vec<u8>,
    stored_err: Option<io::Error>,
    greedy: Option<(usize, usize)>,
    hints: HintList,
) -> Result<()> {
    let cause = match (&stored_err, &greedy) {
        (Some(e), _) => e.to_string(),
        (None, Some((needed, max))) => Error::GreedyHandler(*needed, *max).to_string(),
        (None, None) => "no matcher recognized the connection".to_string(),
    };

    if let (None, Some((needed, max))) = (&stored_err, &greedy) {
        if let Some(logger) = &ctx.logger {
            logger.warn(&Error::GreedyHandler(*needed, *max).to_string());
        }
    }

    if let Some(default) = ctx.default_protocol.clone() {
        if let Some(logger) = &ctx.logger {
            logger.warn(&format!("protocol detection failure: {cause}"));
            logger.info(&format!("defaulting: {}", hex_quote(&header)));
        }
        let peeked: BoxedStream = Box::new(HintedStream::new(
            PeekStream::new(stream, header, stored_err),
            hints.clone(),
        ));
        return invoke_handler(ctx, default, peeked, hints).await;
    }

    if let Some(logger) = &ctx.logger {
        logger.error(&format!("protocol detection failure: {cause}"));
    }
    drop(stream);

    if let Some(err) = stored_err {
        Err(Error::Io(err))
    } else if let Some((needed, max)) = greedy {
        Err(Error::GreedyHandler(needed, max))
    } else {
        Err(Error::NoMatch)
    }
}

/// Renders a header for logging: printable ASCII passes through, everything
/// else becomes a `\xHH` escape.
fn hex_quote(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::Hint;
    use crate::stream::IoStream;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;

    struct PrefixMatcher {
        name: &'static str,
        prefix: &'static [u8],
    }

    #[async_trait]
    impl Matcher for PrefixMatcher {
        fn describe(&self) -> &str {
            self.name
        }

        fn probe(&self, header: &[u8], _hints: &[Arc<dyn Hint>]) -> crate::matcher::Probe {
            let n = self.prefix.len();
            if header.len() < n {
                if header == &self.prefix[..header.len()] {
                    return crate::matcher::Probe::undecided(n);
                }
                return crate::matcher::Probe::reject();
            }
            if &header[..n] == self.prefix {
                crate::matcher::Probe::matched()
            } else {
                crate::matcher::Probe::reject()
            }
        }

        async fn handle(
            &self,
            mut stream: BoxedStream,
        ) -> std::result::Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>>
        {
            let mut buf = Vec::new();
            use tokio::io::AsyncReadExt;
            let _ = stream.read_to_end(&mut buf).await;
            Ok(None)
        }
    }

    fn ctx(matchers: Vec<Arc<dyn Matcher>>, bytes_to_check: usize) -> Arc<DispatchContext> {
        let minimum_read = matchers
            .iter()
            .map(|m| m.probe(&[], &[]).needed)
            .min()
            .unwrap_or(0);
        Arc::new(DispatchContext {
            matchers,
            minimum_read,
            bytes_to_check,
            default_protocol: None,
            logger: None,
        })
    }

    #[tokio::test]
    async fn winner_receives_full_header_verbatim() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let matcher: Arc<dyn Matcher> = Arc::new(RecordingMatcherExact {
            name: "echo",
            prefix: b"ECHO",
            seen: seen.clone(),
        });
        let (mut client, server) = tokio::io::duplex(64);
        let boxed: BoxedStream = Box::new(server);

        client.write_all(b"ECHOhello").await.unwrap();
        client.shutdown().await.unwrap();

        let context = ctx(vec![matcher], 128);
        dispatch(context, boxed, HintList::new(), false).await.unwrap();

        assert_eq!(&*seen.lock().unwrap(), b"ECHOhello");
    }

    struct RecordingMatcherExact {
        name: &'static str,
        prefix: &'static [u8],
        seen: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait]
    impl Matcher for RecordingMatcherExact {
        fn describe(&self) -> &str {
            self.name
        }

        fn probe(&self, header: &[u8], _hints: &[Arc<dyn Hint>]) -> crate::matcher::Probe {
            let n = self.prefix.len();
            if header.len() < n {
                return crate::matcher::Probe::undecided(n);
            }
            if &header[..n] == self.prefix {
                crate::matcher::Probe::matched()
            } else {
                crate::matcher::Probe::reject()
            }
        }

        async fn handle(
            &self,
            mut stream: BoxedStream,
        ) -> std::result::Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>>
        {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await.ok();
            *self.seen.lock().unwrap() = buf;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn no_candidates_and_no_default_returns_no_match() {
        let matcher: Arc<dyn Matcher> = Arc::new(PrefixMatcher {
            name: "http",
            prefix: b"GET ",
        });
        let (mut client, server) = tokio::io::duplex(64);
        let boxed: BoxedStream = Box::new(server);
        client.write_all(b"POST").await.unwrap();
        client.shutdown().await.unwrap();

        let context = ctx(vec![matcher], 128);
        let result = dispatch(context, boxed, HintList::new(), false).await;
        assert!(matches!(result, Err(Error::NoMatch)));
    }

    #[tokio::test]
    async fn greedy_candidate_errors_without_exceeding_budget() {
        struct AlwaysGreedy;

        #[async_trait]
        impl Matcher for AlwaysGreedy {
            fn describe(&self) -> &str {
                "greedy"
            }
            fn probe(&self, _header: &[u8], _hints: &[Arc<dyn Hint>]) -> crate::matcher::Probe {
                crate::matcher::Probe::undecided(9999)
            }
            async fn handle(
                &self,
                _stream: BoxedStream,
            ) -> std::result::Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>>
            {
                Ok(None)
            }
        }

        let matcher: Arc<dyn Matcher> = Arc::new(AlwaysGreedy);
        let (_client, server) = tokio::io::duplex(64);
        let boxed: BoxedStream = Box::new(server);

        let context = ctx(vec![matcher], 16);
        let result = dispatch(context, boxed, HintList::new(), false).await;
        assert!(matches!(result, Err(Error::GreedyHandler(9999, 16))));
    }

    #[tokio::test]
    async fn default_protocol_receives_unread_bytes_on_eof() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let default: Arc<dyn Matcher> = Arc::new(RecordingMatcherExact {
            name: "default",
            prefix: b"",
            seen: seen.clone(),
        });
        let matcher: Arc<dyn Matcher> = Arc::new(PrefixMatcher {
            name: "http",
            prefix: b"GET /",
        });

        let (mut client, server) = tokio::io::duplex(64);
        let boxed: BoxedStream = Box::new(server);
        client.write_all(b"G").await.unwrap();
        client.shutdown().await.unwrap();

        let mut context = ctx(vec![matcher], 128);
        Arc::get_mut(&mut context).unwrap().default_protocol = Some(default);

        dispatch(context, boxed, HintList::new(), false).await.unwrap();
        assert_eq!(&*seen.lock().unwrap(), b"G");
    }

    #[test]
    fn hex_quote_escapes_non_printable_bytes() {
        assert_eq!(hex_quote(b"AB"), "AB");
        assert_eq!(hex_quote(&[0x16, 0x03]), "\\x16\\x03");
    }

    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl crate::sink::Sink for RecordingSink {
        fn log(&self, _level: log::Level, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    /// Outer tunnel matcher: matches on a 4-byte marker, then hands back the
    /// same stream unread so the dispatcher re-enters detection on it.
    struct TunnelStub;

    #[async_trait]
    impl Matcher for TunnelStub {
        fn describe(&self) -> &str {
            "tunnel"
        }

        fn probe(&self, header: &[u8], _hints: &[Arc<dyn Hint>]) -> crate::matcher::Probe {
            let marker = b"WRAP";
            if header.len() < marker.len() {
                return crate::matcher::Probe::undecided(marker.len());
            }
            if &header[..marker.len()] == marker {
                crate::matcher::Probe::matched()
            } else {
                crate::matcher::Probe::reject()
            }
        }

        async fn handle(
            &self,
            mut stream: BoxedStream,
        ) -> std::result::Result<Option<BoxedStream>, Box<dyn std::error::Error + Send + Sync>>
        {
            let mut marker = [0u8; 4];
            stream.read_exact(&mut marker).await?;
            Ok(Some(stream))
        }
    }

    #[tokio::test]
    async fn recursive_handoff_logs_transport_suffix() {
        let sink = Arc::new(RecordingSink {
            lines: Mutex::new(Vec::new()),
        });
        let tunnel: Arc<dyn Matcher> = Arc::new(TunnelStub);
        let inner: Arc<dyn Matcher> = Arc::new(RecordingMatcherExact {
            name: "inner",
            prefix: b"ECHO",
            seen: Arc::new(Mutex::new(Vec::new())),
        });

        let (mut client, server) = tokio::io::duplex(64);
        let boxed: BoxedStream = Box::new(server);
        client.write_all(b"WRAPECHOhi").await.unwrap();
        client.shutdown().await.unwrap();

        let minimum_read = [&tunnel, &inner]
            .iter()
            .map(|m| m.probe(&[], &[]).needed)
            .min()
            .unwrap();
        let context = Arc::new(DispatchContext {
            matchers: vec![tunnel, inner],
            minimum_read,
            bytes_to_check: 128,
            default_protocol: None,
            logger: Some(sink.clone()),
        });

        dispatch(context, boxed, HintList::new(), false)
            .await
            .unwrap();

        let lines = sink.lines.lock().unwrap();
        assert!(lines
            .iter()
            .any(|l| l == "handling connection as tunnel"));
        assert!(lines
            .iter()
            .any(|l| l == "handling connection as inner (transport)"));
    }
}
