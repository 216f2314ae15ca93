use super::request::parse_request;
use super::response::{status_reason, Response};
use crate::dispatcher::Dispatcher;
use crate::errors::RouteError;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Most distinct header lines ever leaked, which caps the memory spent at
/// `MAX_INTERNED_LINES * MAX_INTERNED_LINE` bytes.
const MAX_INTERNED_LINES: usize = 4096;

/// Lines longer than this are never leaked.
const MAX_INTERNED_LINE: usize = 256;

/// Interner for `&'static str` header lines
///
/// may_minihttp only accepts static header lines, so each distinct line is
/// leaked once and reused afterwards. The set is bounded: once it is full,
/// or for an oversized line, no `'static` line can be produced and the
/// header is dropped.
pub struct HeaderLines {
    lines: HashSet<&'static str>,
    capacity: usize,
}

impl HeaderLines {
    /// Interner that leaks at most `capacity` lines
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: HashSet::new(),
            capacity,
        }
    }

    /// Static `name: value` line, or `None` when it cannot be interned
    pub fn line(&mut self, name: &str, value: &str) -> Option<&'static str> {
        let line = format!("{name}: {value}");
        if let Some(existing) = self.lines.get(line.as_str()).copied() {
            return Some(existing);
        }
        if line.len() > MAX_INTERNED_LINE || self.lines.len() >= self.capacity {
            return None;
        }
        let leaked: &'static str = Box::leak(line.into_boxed_str());
        self.lines.insert(leaked);
        Some(leaked)
    }

    /// Number of interned lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when nothing was interned yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

static HEADER_LINES: Lazy<Mutex<HeaderLines>> =
    Lazy::new(|| Mutex::new(HeaderLines::new(MAX_INTERNED_LINES)));

fn header_line(name: &str, value: &str) -> Option<&'static str> {
    let mut lines = match HEADER_LINES.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    lines.line(name, value)
}

/// Transport adapter: converts wire requests, runs the dispatcher, writes
/// the buffered response back.
#[derive(Clone)]
pub struct AppService {
    dispatcher: Arc<Dispatcher>,
}

impl AppService {
    /// Serve requests through `dispatcher`
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher this service forwards to
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

/// Copy a buffered [`Response`] onto the transport response
pub fn write_response(res: &mut may_minihttp::Response, response: Response) {
    let (status, headers, body) = response.into_parts();
    res.status_code(status as usize, status_reason(status));
    for (name, value) in &headers {
        if name.as_ref() == "content-length" {
            continue;
        }
        match header_line(name, value) {
            Some(line) => {
                res.header(line);
            }
            None => warn!(header = %name, "Header dropped, interned header lines exhausted"),
        }
    }
    res.body_vec(body);
}

impl may_minihttp::HttpService for AppService {
    fn call(
        &mut self,
        req: may_minihttp::Request,
        res: &mut may_minihttp::Response,
    ) -> io::Result<()> {
        let Some(mut request) = parse_request(req) else {
            warn!("Rejected request with an invalid method token");
            let mut response = Response::new();
            response.write_error(&RouteError::bad_request("invalid HTTP method"), false);
            write_response(res, response);
            return Ok(());
        };

        let response = self.dispatcher.dispatch(&mut request);
        write_response(res, response);
        Ok(())
    }
}
