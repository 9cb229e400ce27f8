//! In-memory transport that replays a fixed script, for tests and dry runs.

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CallRequest, CallResponse, Transport, TransportError};

/// One scripted exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Empty response with this status.
    Status(u32),
    /// Full response.
    Response(CallResponse),
    /// Connection refused with this message.
    Refused(String),
}

/// Replays replies in order; the last reply repeats once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CallRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script of bare statuses.
    pub fn statuses(codes: &[u32]) -> Self {
        Self::new(codes.iter().map(|&c| Reply::Status(c)))
    }

    /// Number of requests sent so far.
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<CallRequest> {
        lock(&self.requests).clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &CallRequest) -> Result<CallResponse, TransportError> {
        lock(&self.requests).push(request.clone());
        let reply = {
            let mut replies = lock(&self.replies);
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(Reply::Status(status)) => Ok(CallResponse {
                status,
                ..CallResponse::default()
            }),
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Refused(msg)) => {
                Err(io::Error::new(io::ErrorKind::ConnectionRefused, msg).into())
            }
            None => Err(TransportError::InvalidRequest("no scripted reply".to_string())),
        }
    }
}
