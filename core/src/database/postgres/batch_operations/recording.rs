//! In-memory stand-in for the database, recording what the loaders do and what they log.

use std::{
    io,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tracing::{level_filters::LevelFilter, subscriber::DefaultGuard};
use tracing_subscriber::fmt::MakeWriter;

use crate::database::postgres::client::{
    Connection, ConnectionProvider, PostgresConnectionError, PostgresError, ToSql,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Execute { sql: String, params: usize },
    Commit,
    Close,
    Released,
}

#[derive(Default)]
pub struct RecordingProvider {
    events: Arc<Mutex<Vec<Event>>>,
    fail_on_execute: Option<usize>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `n`th execute (zero based) fail.
    pub fn failing_on_execute(n: usize) -> Self {
        RecordingProvider { fail_on_execute: Some(n), ..Self::default() }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn executes(&self) -> Vec<(String, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Execute { sql, params } => Some((sql, params)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|event| *event == wanted).count()
    }
}

pub struct RecordingConnection {
    events: Arc<Mutex<Vec<Event>>>,
    fail_on_execute: Option<usize>,
    executed: usize,
}

impl RecordingConnection {
    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, PostgresError> {
        let n = self.executed;
        self.executed += 1;

        if self.fail_on_execute == Some(n) {
            return Err(PostgresError::ConnectionClosed);
        }

        self.push(Event::Execute { sql: statement.to_string(), params: params.len() });
        Ok(1)
    }

    async fn commit(&mut self) -> Result<(), PostgresError> {
        self.push(Event::Commit);
        Ok(())
    }

    async fn close(self) {
        self.push(Event::Close);
    }
}

impl Drop for RecordingConnection {
    fn drop(&mut self) {
        self.push(Event::Released);
    }
}

#[async_trait]
impl ConnectionProvider for RecordingProvider {
    type Connection = RecordingConnection;

    async fn connect(&self) -> Result<RecordingConnection, PostgresConnectionError> {
        self.events.lock().unwrap().push(Event::Connect);

        Ok(RecordingConnection {
            events: Arc::clone(&self.events),
            fail_on_execute: self.fail_on_execute,
            executed: 0,
        })
    }
}

/// INFO output of the current thread, one message per line.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Captures until the returned guard is dropped. Tokio tests run on one thread, so the
    /// guard covers every `.await` of the test body.
    pub fn start() -> (Self, DefaultGuard) {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(LevelFilter::INFO)
            .with_ansi(false)
            .with_level(false)
            .with_target(false)
            .without_time()
            .finish();

        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        let buffer = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buffer).lines().map(|line| line.trim().to_string()).collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
