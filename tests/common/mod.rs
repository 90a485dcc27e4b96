#![allow(dead_code)]

use pcbdbg::session::{Connector, InstrumentKind, InstrumentSession, SessionError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(InstrumentKind),
    Write(InstrumentKind, String),
    Query(InstrumentKind, String),
}

/// Stateless mock bench: fixed replies per query string, every call recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    events: Arc<Mutex<Vec<Event>>>,
    replies: HashMap<String, String>,
    offline: Vec<InstrumentKind>,
    failing_writes: Vec<String>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, query: &str, reply: &str) -> Self {
        self.replies.insert(query.to_string(), reply.to_string());
        self
    }

    pub fn offline(mut self, kind: InstrumentKind) -> Self {
        self.offline.push(kind);
        self
    }

    pub fn fail_write(mut self, command: &str) -> Self {
        self.failing_writes.push(command.to_string());
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Write(_, command) => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Connector for RecordingConnector {
    fn open(&self, kind: InstrumentKind) -> Result<Box<dyn InstrumentSession>, SessionError> {
        self.events.lock().unwrap().push(Event::Open(kind));
        if self.offline.contains(&kind) {
            return Err(SessionError::Unavailable { kind });
        }
        Ok(Box::new(RecordingSession {
            kind,
            connector: self.clone(),
        }))
    }
}

struct RecordingSession {
    kind: InstrumentKind,
    connector: RecordingConnector,
}

impl InstrumentSession for RecordingSession {
    fn write(&mut self, command: &str) -> Result<(), SessionError> {
        self.connector
            .events
            .lock()
            .unwrap()
            .push(Event::Write(self.kind, command.to_string()));
        if self.connector.failing_writes.iter().any(|c| c == command) {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )));
        }
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, SessionError> {
        self.connector
            .events
            .lock()
            .unwrap()
            .push(Event::Query(self.kind, command.to_string()));
        self.connector
            .replies
            .get(command)
            .cloned()
            .ok_or_else(|| SessionError::Rejected(command.to_string()))
    }
}
