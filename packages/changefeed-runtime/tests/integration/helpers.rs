//! Shared fixtures.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use changefeed_core::{EventModelsGroup, Materializer, PipelineConfig};
use changefeed_runtime::{ChangefeedError, CaptureSource};
use tracing_subscriber::layer::{Context, Layer};

pub type TestMaterializer = Materializer<HashMap<String, String>, Vec<EventModelsGroup>>;

pub fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        app_name: "Shop".to_string(),
        connection_name: "primary".to_string(),
        buffer_dir: dir.join("buffers"),
        binary_dir: dir.join("bin"),
        liveness_interval_ms: 50,
        queue_capacity: 8,
        read_chunk_size: 16,
        diagnostic_stdout: false,
        ..Default::default()
    }
}

pub fn materializer(config: &PipelineConfig) -> TestMaterializer {
    let resolver = HashMap::from([("users".to_string(), "User".to_string())]);
    let materializer = Materializer::new(config, resolver, Vec::new());
    materializer.prepare().unwrap();
    materializer
}

/// Blocking reader over chunks sent through a std channel; end of stream
/// once every sender is dropped.
pub struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// In-memory capture source.
pub struct FakeSource {
    output: Option<ChannelReader>,
    pub alive: Arc<AtomicBool>,
    pub signals: Arc<Mutex<Vec<i32>>>,
}

impl FakeSource {
    pub fn new() -> (Self, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let source = Self {
            output: Some(ChannelReader {
                rx,
                pending: Vec::new(),
            }),
            alive: Arc::new(AtomicBool::new(true)),
            signals: Arc::new(Mutex::new(Vec::new())),
        };
        (source, tx)
    }
}

impl CaptureSource for FakeSource {
    fn pid(&self) -> u32 {
        4242
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.output
            .take()
            .map(|reader| Box::new(reader) as Box<dyn Read + Send>)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn forward_signal(&mut self, signal: i32) -> Result<(), ChangefeedError> {
        self.signals.lock().unwrap().push(signal);
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Flattens dispatched groups into `(action, table, id)` triples.
pub fn dispatched(materializer: &TestMaterializer) -> Vec<(&'static str, String, i64)> {
    materializer
        .dispatcher()
        .iter()
        .flat_map(|group| {
            group.entities.iter().map(move |entity| {
                (
                    group.operation.action(),
                    group.entity_kind.clone(),
                    entity.get("id").and_then(|v| v.as_i64()).unwrap(),
                )
            })
        })
        .collect()
}

pub const TRANSACTION: &str = concat!(
    "{\"action\":\"B\",\"xid\":7}\n",
    "{\"action\":\"I\",\"xid\":7,\"table\":\"users\",\"columns\":[{\"name\":\"id\",\"value\":1},{\"name\":\"name\",\"value\":\"a\"}]}\n",
    "\n",
    "{\"action\":\"U\",\"xid\":7,\"table\":\"users\",\"identity\":[{\"name\":\"id\",\"value\":1}],\"columns\":[{\"name\":\"name\",\"value\":\"b\"}]}\n",
    "{\"action\":\"C\",\"xid\":7}\n",
);

/// Counts ERROR events seen on the current thread's subscriber.
pub struct ErrorCounter(pub Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
