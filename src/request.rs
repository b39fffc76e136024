//! Incoming HTTP request type.

use std::borrow::Cow;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};
use percent_encoding::percent_decode_str;

/// An incoming HTTP request with its body fully buffered.
///
/// Stages receive it by shared reference: the request itself is never
/// substituted on the way down the chain, only the [`Context`](crate::Context)
/// and the response sink are.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: String,
}

impl Request {
    pub fn new(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }

    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: String::new(),
        }
    }

    /// Sets the peer address as reported by the transport, usually `ip:port`.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> &str { &self.remote_addr }

    /// Header lookup; names are case-insensitive. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Path and query as sent by the client, `/` when the URI has none.
    pub fn request_uri(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// The user name from the URI's userinfo (`user:pass@host`), if present
    /// and non-empty. Percent-escapes are decoded; invalid UTF-8 is replaced.
    pub fn user(&self) -> Option<Cow<'_, str>> {
        let authority = self.uri.authority()?.as_str();
        let (userinfo, _) = authority.rsplit_once('@')?;
        let name = userinfo.split_once(':').map_or(userinfo, |(name, _)| name);
        (!name.is_empty()).then(|| percent_decode_str(name).decode_utf8_lossy())
    }

    /// Host part of [`remote_addr`](Self::remote_addr), or the raw value when
    /// it has no port to split off.
    pub fn client_host(&self) -> &str {
        split_host(&self.remote_addr).unwrap_or(self.remote_addr.as_str())
    }
}

/// `host:port` → `host`, `[v6]:port` → `v6`. `None` when there is no port.
fn split_host(addr: &str) -> Option<&str> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        return tail.strip_prefix(':').map(|_| host);
    }
    let (host, _port) = addr.rsplit_once(':')?;
    // A bare IPv6 address has colons but no port.
    (!host.contains(':')).then_some(host)
}
