//! Mock SCSI transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{ScsiTransport, TransportError};

/// One captured `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScsiCall {
    pub command: Vec<u8>,
    pub data_out: Option<Vec<u8>>,
    pub response_len: usize,
}

struct Script {
    prefix: Vec<u8>,
    responses: VecDeque<Vec<u8>>,
}

/// Mock transport for unit testing device and orchestration logic.
///
/// Responses are resolved in this order:
/// 1. the first script whose prefix matches the command bytes (a script
///    pops its responses in order and repeats the last one forever);
/// 2. the FIFO queue, for commands that expect a response;
/// 3. `response_len` zero bytes, or `NoResponse` in strict mode.
///
/// Commands with `response_len == 0` never consume the queue.
pub struct MockTransport {
    scripts: Arc<Mutex<Vec<Script>>>,
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured calls.
    call_log: Arc<Mutex<Vec<ScsiCall>>>,
    strict: bool,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
            strict: false,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// A mock that fails when no response is available instead of
    /// answering with zeros.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// Always answer commands starting with `prefix` with `response`.
    pub fn respond_to(&self, prefix: &[u8], response: &[u8]) {
        self.respond_seq(prefix, vec![response.to_vec()]);
    }

    /// Answer commands starting with `prefix` with `responses` in order;
    /// the last one repeats.
    pub fn respond_seq(&self, prefix: &[u8], responses: Vec<Vec<u8>>) {
        self.scripts.lock().unwrap().push(Script {
            prefix: prefix.to_vec(),
            responses: responses.into(),
        });
    }

    /// Queue a response to be returned to the next command expecting data.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Get all captured calls.
    pub fn calls(&self) -> Vec<ScsiCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Captured calls whose command starts with `prefix`.
    pub fn calls_matching(&self, prefix: &[u8]) -> Vec<ScsiCall> {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Clear captured calls.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn scripted(&self, command: &[u8]) -> Option<Vec<u8>> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .iter_mut()
            .find(|s| command.starts_with(&s.prefix))?;
        if script.responses.len() > 1 {
            script.responses.pop_front()
        } else {
            script.responses.front().cloned()
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScsiTransport for MockTransport {
    fn execute(
        &self,
        command: &[u8],
        data_out: Option<&[u8]>,
        response_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.call_log.lock().unwrap().push(ScsiCall {
            command: command.to_vec(),
            data_out: data_out.map(<[u8]>::to_vec),
            response_len,
        });

        if let Some(response) = self.scripted(command) {
            return Ok(response);
        }
        if response_len == 0 {
            return Ok(Vec::new());
        }
        if let Some(response) = self.queue.lock().unwrap().pop_front() {
            return Ok(response);
        }
        if self.strict {
            return Err(TransportError::NoResponse(format!("{:02X?}", command)));
        }
        Ok(vec![0u8; response_len])
    }
}
