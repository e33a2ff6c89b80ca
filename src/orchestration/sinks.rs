//! Message sinks for publishing progress

use crate::core::traits::{EventType, MessageSink};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

/// Prints one line per event; debug events only when `verbose`
#[derive(Debug, Clone, Default)]
pub struct StdoutSink {
    verbose: bool,
}

impl StdoutSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl MessageSink for StdoutSink {
    fn message(&self, event: EventType, text: &str) {
        match event {
            EventType::Debug if !self.verbose => {}
            EventType::Fail => eprintln!("{:>7}: {}", event.as_str(), text),
            _ => println!("{:>7}: {}", event.as_str(), text),
        }
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&self, event: EventType, text: &str) {
        match event {
            EventType::Fail => error!(event = event.as_str(), "{}", text),
            EventType::Debug => debug!(event = event.as_str(), "{}", text),
            _ => info!(event = event.as_str(), "{}", text),
        }
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(EventType, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(EventType, String)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, text)| text).collect()
    }
}

impl MessageSink for MemorySink {
    fn message(&self, event: EventType, text: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, text.to_string()));
    }
}
