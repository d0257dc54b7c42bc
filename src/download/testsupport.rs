//! In-process HTTP server handing out a byte blob, with optional Range
//! support toggles, for exercising the transfer path without a network.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;

struct Settings {
    data: Vec<u8>,
    ignore_range: AtomicBool,
    chunk_delay_ms: AtomicU64,
}

pub(crate) struct BlobServer {
    addr: SocketAddr,
    settings: Arc<Settings>,
    handle: tokio::task::JoinHandle<()>,
}

impl BlobServer {
    pub(crate) fn url(&self) -> String {
        format!("http://{}/blob", self.addr)
    }

    pub(crate) fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Pretend to be a server that ignores Range headers and always replies
    /// 200 with the full body.
    pub(crate) fn ignore_range(&mut self) {
        self.settings.ignore_range.store(true, Ordering::SeqCst);
    }

    /// Delay between 8 KiB chunks, to give tests time to cancel or pause
    /// mid-transfer.
    pub(crate) fn chunk_delay(&mut self, delay: Duration) {
        self.settings
            .chunk_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Drop for BlobServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub(crate) async fn spawn_blob_server(data: Vec<u8>) -> BlobServer {
    let settings = Arc::new(Settings {
        data,
        ignore_range: AtomicBool::new(false),
        chunk_delay_ms: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/blob", get(serve_blob))
        .with_state(settings.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    BlobServer {
        addr,
        settings,
        handle,
    }
}

async fn serve_blob(State(settings): State<Arc<Settings>>, headers: HeaderMap) -> Response {
    let total = settings.data.len() as u64;

    let mut start = 0u64;
    let mut partial = false;
    if !settings.ignore_range.load(Ordering::SeqCst) {
        if let Some(offset) = parse_range_start(&headers) {
            if offset <= total {
                start = offset;
                partial = true;
            }
        }
    }

    let body_bytes = settings.data[start as usize..].to_vec();
    let delay = Duration::from_millis(settings.chunk_delay_ms.load(Ordering::SeqCst));

    let status = if partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_LENGTH, body_bytes.len());
    if partial {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {start}-{}/{total}", total.saturating_sub(1)),
        );
    }

    let body = if delay.is_zero() {
        Body::from(body_bytes)
    } else {
        let chunks: Vec<Bytes> = body_bytes
            .chunks(8 * 1024)
            .map(Bytes::copy_from_slice)
            .collect();
        let stream = futures_util::stream::iter(chunks).then(move |chunk| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, std::convert::Infallible>(chunk)
        });
        Body::from_stream(stream)
    };

    builder.body(body).expect("response")
}

fn parse_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let rest = value.strip_prefix("bytes=")?;
    let start = rest.strip_suffix('-')?;
    start.parse::<u64>().ok()
}

/// A small but real app archive: `Payload/Demo.app/` with an Info.plist and
/// a padded binary so transfers span several chunks.
pub(crate) fn app_zip_bytes() -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer
        .start_file("Payload/Demo.app/Info.plist", options)
        .expect("entry");
    writer.write_all(b"<plist/>").expect("write");
    // stored, not deflated: the repeating filler would otherwise compress
    // into a single chunk and defeat the multi-chunk transfer
    let stored = options.compression_method(zip::CompressionMethod::Stored);
    writer
        .start_file("Payload/Demo.app/Demo", stored)
        .expect("entry");
    let filler: Vec<u8> = (0..120_000).map(|i| (i % 199) as u8).collect();
    writer.write_all(&filler).expect("write");
    writer.finish().expect("finish").into_inner()
}
