use foam_model::StreamKind;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc,
};
use tracing::trace;

/// Read `reader` line by line until end-of-stream and forward every non-empty line.
///
/// Bytes are decoded lossily; `\n` and a trailing `\r` are stripped. A final
/// line without a newline is still forwarded. Returns early if the receiver
/// is gone.
pub(crate) async fn pump<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<(StreamKind, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let Some(line) = decode_line(&buf) else {
                    continue;
                };
                if tx.send((stream, line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                trace!(target: "foam.exec.reader", stream = stream.as_str(), error = %e, "read failed");
                break;
            }
        }
    }
}

/// Lossy UTF-8 with line terminators stripped. `None` for empty lines.
fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}
