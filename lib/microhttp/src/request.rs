// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP request head parsing and generation.
//!
//! Parsing is total: hostile or truncated input degrades to a request
//! with [`Method::None`] and whatever fields were recovered, never a
//! panic. Only headers retained by the path's routing scheme are stored;
//! the rest are skipped without copying. A form-encoded body (announced
//! by `Content-Length`) lands in the URL's query list.
//!
//! Generation emits ASCII with CRLF endings, `HTTP/1.0` unless the
//! connection is persistent or upgrading, and fills in the boilerplate
//! headers a caller didn't set explicitly.

use crate::{
    header::HeaderList,
    route::{RouteTable, Scheme},
    url::{Host, Protocol, Url},
};
use core::fmt;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    None,
    Get,
    Post,
}

impl Method {
    fn token(self) -> Option<&'static str> {
        match self {
            Method::None => None,
            Method::Get => Some("GET"),
            Method::Post => Some("POST"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Connection {
    #[default]
    Close,
    KeepAlive,
    Upgrade,
}

/// An HTTP request: the parse result on the server side, the thing to
/// serialize on the client side.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Header-retention scheme the router chose for the path.
    pub scheme: Scheme,
    pub connection: Connection,
    pub content_length: u32,
    /// Retained headers, minus `Host` and `Content-Length`, which land
    /// in `url` and `content_length`.
    pub headers: HeaderList,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            method: Method::None,
            url: Url::new(),
            scheme: Scheme::HTTP_REQUEST,
            connection: Connection::Close,
            content_length: 0,
            headers: HeaderList::new(),
        }
    }

    /// Parses a request head (and form body, if announced).
    ///
    /// `routes` decides which headers are worth keeping for this path.
    /// The final protocol on the URL is `ws` exactly when the scheme has
    /// the WS-request bit *and* the peer sent `Sec-WebSocket-Key`.
    pub fn parse(routes: &RouteTable, input: &[u8]) -> Self {
        let mut req = Request::new();
        let Ok(text) = core::str::from_utf8(input) else {
            return req;
        };
        let Some((line, mut rest)) = split_line(text) else {
            return req;
        };

        let mut tokens = line.split_ascii_whitespace();
        req.method = match tokens.next() {
            Some("GET") => Method::Get,
            Some("POST") => Method::Post,
            _ => Method::None,
        };
        if let Some(target) = tokens.next() {
            // Truncation leaves a partial URL; keep going regardless.
            let _ = req.url.parse_target(target);
        }
        req.scheme = routes.scheme_for(req.url.path());

        let mut body = "";
        while let Some((line, next)) = split_line(rest) {
            rest = next;
            if line.is_empty() {
                body = rest;
                break;
            }
            let Some(colon) = line.find(':') else {
                // Not a header line; give up on the head.
                break;
            };
            let name = line[..colon].trim_start();
            let keep = retained(name, req.scheme);

            let mut value: heapless::String<{ crate::HEADER_VALUE_MAX }> =
                heapless::String::new();
            let mut fits = keep;
            if keep {
                fits &= value
                    .push_str(trim_lws(&line[colon + 1..]))
                    .is_ok();
            }
            // Legacy folded continuations: every line starting with
            // SP/HT extends the value, folding whitespace dropped.
            while let Some((cont, cnext)) = split_line(rest) {
                if !cont.starts_with(' ') && !cont.starts_with('\t') {
                    break;
                }
                rest = cnext;
                if keep {
                    fits &= value.push_str(trim_lws(cont)).is_ok();
                }
            }
            if !fits {
                // Unretained, or retained but over capacity: skipped.
                continue;
            }

            if name.eq_ignore_ascii_case("Content-Length") {
                req.content_length = lenient_u32(&value);
            } else if name.eq_ignore_ascii_case("Host") {
                let _ = req.url.set_hostname(&value);
            } else {
                let _ = req.headers.add(name, &value);
            }
        }

        if req.content_length > 0 {
            let body = body.as_bytes();
            let take = (req.content_length as usize).min(body.len());
            req.url.query.parse_append(&body[..take]);
        }

        req.url.protocol = if req.scheme.contains(Scheme::WS_REQUEST)
            && req.headers.get("Sec-WebSocket-Key").is_some()
        {
            Protocol::Ws
        } else {
            Protocol::Http
        };
        req
    }

    /// Serializes the request. `body` overrides the implicit POST form
    /// body; without either, the head ends with the lone blank line.
    ///
    /// Writing nothing for [`Method::None`] mirrors the parser's use of
    /// that value as "not a request".
    pub fn write_to(
        &self,
        out: &mut dyn fmt::Write,
        body: Option<&str>,
    ) -> fmt::Result {
        let Some(token) = self.method.token() else {
            return Ok(());
        };
        let upgrading =
            self.url.protocol.is_websocket() || self.connection == Connection::Upgrade;

        out.write_str(token)?;
        out.write_char(' ')?;
        let path = self.url.path();
        if path.is_empty() {
            out.write_char('/')?;
        } else {
            out.write_str(path)?;
        }
        // GET carries the query in the target; POST moves it to the body.
        if self.method == Method::Get && !self.url.query.is_empty() {
            out.write_char('?')?;
            self.url.query.write_to(out)?;
        }
        if self.connection == Connection::Close && !upgrading {
            out.write_str(" HTTP/1.0\r\n")?;
        } else {
            out.write_str(" HTTP/1.1\r\n")?;
        }

        if self.headers.get("Host").is_none() {
            match self.url.host() {
                Host::None => {}
                Host::Name(name) => write!(out, "Host: {name}\r\n")?,
                Host::Ip(ip) => write!(out, "Host: {ip}\r\n")?,
            }
        }
        if self.headers.get("Connection").is_none() {
            let mode = if upgrading {
                "Upgrade"
            } else if self.connection == Connection::KeepAlive {
                "keep-alive"
            } else {
                "close"
            };
            write!(out, "Connection: {mode}\r\n")?;
        }
        if self.headers.get("User-Agent").is_none() {
            out.write_str("User-Agent: microhttp/1.0\r\n")?;
        }
        if self.headers.get("Accept").is_none() {
            out.write_str(
                "Accept: text/html,application/xhtml+xml,*/*;q=0.8\r\n",
            )?;
        }
        for field in self.headers.iter() {
            field.write_to(out)?;
            out.write_str("\r\n")?;
        }

        if let Some(content) = body {
            write!(out, "Content-Length: {}\r\n\r\n", content.len())?;
            out.write_str(content)?;
        } else if self.method == Method::Post && !self.url.query.is_empty() {
            out.write_str(
                "Content-Type: application/x-www-form-urlencoded\r\n",
            )?;
            write!(
                out,
                "Content-Length: {}\r\n\r\n",
                self.url.query.encoded_len()
            )?;
            self.url.query.write_to(out)?;
        } else {
            out.write_str("\r\n")?;
        }
        Ok(())
    }
}

/// Splits off one line at LF, tolerating both CRLF and bare LF endings.
fn split_line(text: &str) -> Option<(&str, &str)> {
    let nl = text.find('\n')?;
    let line = text[..nl].strip_suffix('\r').unwrap_or(&text[..nl]);
    Some((line, &text[nl + 1..]))
}

fn trim_lws(text: &str) -> &str {
    text.trim_matches([' ', '\t'])
}

/// Whether a header named `name` survives parsing under `scheme`.
/// `Host` and `Content-Length` always do.
fn retained(name: &str, scheme: Scheme) -> bool {
    if name.eq_ignore_ascii_case("Host")
        || name.eq_ignore_ascii_case("Content-Length")
    {
        return true;
    }
    if scheme.contains(Scheme::WS_REQUEST)
        && (name.eq_ignore_ascii_case("Upgrade")
            || name.eq_ignore_ascii_case("Sec-WebSocket-Key")
            || name.eq_ignore_ascii_case("Sec-WebSocket-Version"))
    {
        return true;
    }
    if scheme.contains(Scheme::WS_RESPONSE)
        && (name.eq_ignore_ascii_case("Upgrade")
            || name.eq_ignore_ascii_case("Sec-WebSocket-Accept"))
    {
        return true;
    }
    false
}

/// Forgiving decimal parse: leading whitespace skipped, first non-digit
/// ends the number.
fn lenient_u32(text: &str) -> u32 {
    let mut value = 0u32;
    for byte in text.trim_start().bytes() {
        if !byte.is_ascii_digit() {
            break;
        }
        value = value.wrapping_mul(10).wrapping_add(u32::from(byte - b'0'));
    }
    value
}
