use crate::errors::RouteError;
use crate::ids::RequestId;
use crate::router::{ParamValue, ParamVec, PathParam};
use http::{Extensions, Method};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

/// Maximum number of headers before heap allocation.
/// Typical API requests carry fewer than 16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage; names are lower-cased on insert.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Request body
///
/// A `Reader` body is drained on first access and replaced by `Buffered`,
/// so every later read sees the same bytes.
pub enum Body {
    /// No body was sent
    Empty,
    /// Not yet read
    Reader(Box<dyn Read + Send>),
    /// Fully read and cached
    Buffered(Vec<u8>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Reader(_) => f.write_str("Body::Reader(..)"),
            Body::Buffered(bytes) => write!(f, "Body::Buffered({} bytes)", bytes.len()),
        }
    }
}

/// Per-request context handed to middleware and handlers
///
/// Built by the transport adapter (or directly in tests), enriched by the
/// dispatcher with the matched parameters and bound model.
pub struct Request {
    request_id: RequestId,
    method: Method,
    path: String,
    query: String,
    headers: HeaderVec,
    remote_addr: Option<SocketAddr>,
    body: Body,
    params: ParamVec,
    bound: Option<Box<dyn Any + Send + Sync>>,
    extensions: Extensions,
    upgradable: bool,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("remote_addr", &self.remote_addr)
            .field("body", &self.body)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Create a request from a method and a raw target (`/path?query`)
    ///
    /// The path is percent-decoded once; routing and file mapping see the
    /// decoded form. Invalid UTF-8 escapes leave the path as sent.
    ///
    /// # Example
    ///
    /// ```
    /// use starroute::Request;
    /// use http::Method;
    ///
    /// let req = Request::new(Method::GET, "/search?q=rust&page=2");
    /// assert_eq!(req.path(), "/search");
    /// assert_eq!(req.query_param("q").as_deref(), Some("rust"));
    /// ```
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let path = if path.is_empty() { "/" } else { path };
        let path = match urlencoding::decode(path) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => path.to_string(),
        };
        Self {
            request_id: RequestId::new(),
            method,
            path,
            query: query.to_string(),
            headers: HeaderVec::new(),
            remote_addr: None,
            body: Body::Empty,
            params: ParamVec::new(),
            bound: None,
            extensions: Extensions::new(),
            upgradable: true,
        }
    }

    /// Add a header (name is lower-cased)
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push_header(name, value.into());
        self
    }

    /// Set an already-buffered body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Buffered(body.into());
        self
    }

    /// Set a body that is read lazily on first access
    #[must_use]
    pub fn with_body_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Body::Reader(Box::new(reader));
        self
    }

    /// Set the peer address of the connection
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Mark the connection as unable to switch protocols
    #[must_use]
    pub fn without_upgrade(mut self) -> Self {
        self.upgradable = false;
        self
    }

    /// Whether the connection can be handed over after a `101` response
    #[must_use]
    pub fn supports_upgrade(&self) -> bool {
        self.upgradable
    }

    pub(crate) fn push_header(&mut self, name: &str, value: String) {
        if name.eq_ignore_ascii_case("x-request-id") {
            if let Ok(id) = value.parse::<RequestId>() {
                self.request_id = id;
            }
        }
        self.headers
            .push((Arc::from(name.to_ascii_lowercase().as_str()), value));
    }

    /// Correlation id (taken from `X-Request-ID` when it carries a valid ULID)
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string (without `?`)
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Peer address, when the transport provides one
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// All headers, names lower-cased
    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// First value of a header (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cookies from the `Cookie` header
    #[must_use]
    pub fn cookies(&self) -> HashMap<String, String> {
        self.header("cookie").map(parse_cookies).unwrap_or_default()
    }

    /// Single cookie by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Query pairs in order of appearance, URL-decoded
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Query map keeping the first value of each key
    #[must_use]
    pub fn query(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (k, v) in self.query_pairs() {
            map.entry(k).or_insert(v);
        }
        map
    }

    /// First value of a query parameter
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Query as a JSON object
    ///
    /// Keys seen once map to a string, repeated keys to an array of strings.
    #[must_use]
    pub fn query_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (k, v) in self.query_pairs() {
            match map.get_mut(&k) {
                None => {
                    map.insert(k, Value::String(v));
                }
                Some(Value::Array(items)) => items.push(Value::String(v)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(v)]);
                }
            }
        }
        map
    }

    /// Read the whole body, caching it for later reads
    pub fn body_bytes(&mut self) -> io::Result<&[u8]> {
        if let Body::Reader(reader) = &mut self.body {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            debug!(bytes = buf.len(), "Request body buffered");
            self.body = Body::Buffered(buf);
        }
        match &self.body {
            Body::Buffered(bytes) => Ok(bytes),
            _ => Ok(&[]),
        }
    }

    /// Decode the body as JSON into `T`
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, RouteError> {
        let bytes = self.body_bytes()?;
        if bytes.is_empty() {
            return Err(RouteError::bad_request("request body is empty"));
        }
        serde_json::from_slice(bytes).map_err(|e| RouteError::bad_request(e.to_string()))
    }

    /// Decode the body as a JSON object
    pub fn json_map(&mut self) -> Result<Map<String, Value>, RouteError> {
        self.json::<Map<String, Value>>()
    }

    /// Client addresses, most specific first
    ///
    /// Collects public addresses from `X-Forwarded-For`, `X-Real-IP`,
    /// `CF-Connecting-IP` and `X-Forwarded`, skipping private, loopback and
    /// link-local ranges. Falls back to the peer address, then `"unknown"`.
    /// Duplicates are removed, keeping the first occurrence.
    #[must_use]
    pub fn client_ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = Vec::new();
        let mut push = |candidate: &str| {
            let candidate = candidate.trim();
            if candidate.is_empty() || is_private_ip(candidate) {
                return;
            }
            if !ips.iter().any(|ip| ip == candidate) {
                ips.push(candidate.to_string());
            }
        };

        if let Some(xff) = self.header("x-forwarded-for") {
            xff.split(',').for_each(&mut push);
        }
        for name in ["x-real-ip", "cf-connecting-ip", "x-forwarded"] {
            if let Some(value) = self.header(name) {
                push(value);
            }
        }

        if ips.is_empty() {
            ips.push(
                self.remote_addr
                    .map(|addr| addr.ip().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            );
        }
        ips
    }

    /// Primary client address
    #[must_use]
    pub fn client_ip(&self) -> String {
        self.client_ips()
            .into_iter()
            .next()
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// True for a websocket upgrade request
    ///
    /// Requires `GET`, a `Connection` header containing the `upgrade` token,
    /// `Upgrade: websocket`, and both `Sec-WebSocket-Key` and
    /// `Sec-WebSocket-Version`.
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.method == Method::GET
            && self.header("connection").is_some_and(|v| {
                v.split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
            })
            && self
                .header("upgrade")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
            && self.header("sec-websocket-key").is_some()
            && self.header("sec-websocket-version").is_some()
    }

    /// Extracted path parameters in template order
    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    /// Typed path parameter by name
    ///
    /// When a name repeats across nested templates the last one wins.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .rev()
            .find(|p| p.key.as_ref() == name)
            .and_then(|p| p.value.as_ref())
    }

    /// `str` parameter by name
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(ParamValue::as_str)
    }

    /// `int` parameter by name
    #[must_use]
    pub fn param_i64(&self, name: &str) -> Option<i64> {
        self.param(name).and_then(ParamValue::as_i64)
    }

    /// `float` parameter by name
    #[must_use]
    pub fn param_f64(&self, name: &str) -> Option<f64> {
        self.param(name).and_then(ParamValue::as_f64)
    }

    /// `bool` parameter by name
    #[must_use]
    pub fn param_bool(&self, name: &str) -> Option<bool> {
        self.param(name).and_then(ParamValue::as_bool)
    }

    /// Replace the parameters (done by the dispatcher after matching)
    pub fn set_params(&mut self, params: ParamVec) {
        self.params = params;
    }

    pub(crate) fn push_param(&mut self, key: Arc<str>, value: Option<ParamValue>) {
        self.params.push(PathParam { key, value });
    }

    /// Model produced by the route's binding, if any
    #[must_use]
    pub fn bound<T: Any>(&self) -> Option<&T> {
        self.bound.as_deref().and_then(|b| b.downcast_ref::<T>())
    }

    pub(crate) fn set_bound(&mut self, model: Box<dyn Any + Send + Sync>) {
        self.bound = Some(model);
    }

    /// Per-request extension map for middleware-to-handler values
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable extension map
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Parse a `Cookie` header value into name/value pairs
#[must_use]
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// True for addresses that never identify a public client
///
/// Unparseable text counts as private so it is never reported.
#[must_use]
pub fn is_private_ip(candidate: &str) -> bool {
    let Ok(ip) = candidate.parse::<IpAddr>() else {
        return true;
    };
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Convert a transport request into a [`Request`]
///
/// Returns `None` when the method token is not a valid HTTP method.
pub fn parse_request(req: may_minihttp::Request) -> Option<Request> {
    let method = Method::from_bytes(req.method().as_bytes()).ok()?;
    // may_minihttp keeps parsing the socket as HTTP after any response
    let mut request = Request::new(method, req.path()).without_upgrade();

    for header in req.headers().iter() {
        request.push_header(header.name, String::from_utf8_lossy(header.value).into_owned());
    }

    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        debug!(error = %e, "Failed to read request body");
    }
    if !body.is_empty() {
        request.body = Body::Buffered(body);
    }

    debug!(
        request_id = %request.request_id,
        method = %request.method,
        path = %request.path,
        header_count = request.headers.len(),
        "Request parsed"
    );
    Some(request)
}
