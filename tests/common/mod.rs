#![allow(dead_code)]

pub mod requests {
    use http::Method;
    use starroute::{Dispatcher, Request, Response};

    /// Dispatch a bodiless request
    pub fn send(dispatcher: &Dispatcher, method: Method, target: &str) -> Response {
        let mut req = Request::new(method, target);
        dispatcher.dispatch(&mut req)
    }

    /// Dispatch a request with a JSON body
    pub fn send_json(dispatcher: &Dispatcher, method: Method, target: &str, body: &str) -> Response {
        let mut req = Request::new(method, target)
            .with_header("content-type", "application/json")
            .with_body(body.as_bytes().to_vec());
        dispatcher.dispatch(&mut req)
    }

    /// Parse the response body as JSON
    pub fn body_json(res: &Response) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }
}

pub mod multipart {
    pub const BOUNDARY: &str = "----starrouteTestBoundary";

    /// Build a multipart/form-data body from (field, file name, content) parts
    pub fn body(parts: &[(&str, &str, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (field, file_name, content) in parts {
            out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
                )
                .as_bytes(),
            );
            out.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            out.extend_from_slice(content.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        out
    }

    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}

pub mod test_server {
    use std::net::TcpListener;
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Reserve a free local port
    pub fn free_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }
}

pub mod raw_http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw HTTP/1.1 request and return (status, headers, body)
    pub fn send_request(addr: SocketAddr, raw: &str) -> (u16, String, String) {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if response_complete(&buf) {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let text = String::from_utf8_lossy(&buf).into_owned();
        let (head, body) = text.split_once("\r\n\r\n").unwrap_or((&text, ""));
        let status = head
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        (status, head.to_string(), body.to_string())
    }

    fn response_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }
}
