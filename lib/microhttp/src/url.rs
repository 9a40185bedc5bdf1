// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! URL model, parser, and serializer.
//!
//! The accepted shape is
//! `[//][scheme://][user@]host[:port][/path][?query][#fragment]` with any
//! of the pieces absent. Fragments are accepted and discarded. A host
//! that parses as a dotted quad is stored as a packed address rather than
//! a hostname; the [`Host`] enum makes the two representations mutually
//! exclusive by construction.

use crate::{query::QueryList, Error, HOST_MAX, PATH_MAX};
use core::fmt;
use core::net::Ipv4Addr;
use heapless::String;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    None,
    Http,
    Https,
    Ws,
    Wss,
}

impl Protocol {
    /// Scheme keyword, or `None` for an unset protocol.
    pub fn scheme_str(self) -> Option<&'static str> {
        match self {
            Protocol::None => None,
            Protocol::Http => Some("http"),
            Protocol::Https => Some("https"),
            Protocol::Ws => Some("ws"),
            Protocol::Wss => Some("wss"),
        }
    }

    /// Case-insensitive match over the known schemes; anything else maps
    /// to `None`.
    pub fn from_scheme(scheme: &str) -> Self {
        if scheme.eq_ignore_ascii_case("http") {
            Protocol::Http
        } else if scheme.eq_ignore_ascii_case("https") {
            Protocol::Https
        } else if scheme.eq_ignore_ascii_case("ws") {
            Protocol::Ws
        } else if scheme.eq_ignore_ascii_case("wss") {
            Protocol::Wss
        } else {
            Protocol::None
        }
    }

    pub fn is_websocket(self) -> bool {
        matches!(self, Protocol::Ws | Protocol::Wss)
    }
}

/// Where requests go. A named host and a packed IPv4 address are
/// exclusive; assignment through [`Url::set_hostname`] keeps them so.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Host {
    #[default]
    None,
    Ip(Ipv4Addr),
    Name(String<HOST_MAX>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Url {
    pub protocol: Protocol,
    host: Host,
    /// 0 means unspecified.
    pub port: u16,
    path: String<PATH_MAX>,
    pub query: QueryList,
}

impl Url {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), Error> {
        self.path.clear();
        self.path.push_str(path).map_err(|_| Error::Truncated)
    }

    /// Assigns the host. A dotted-quad name becomes [`Host::Ip`]; an
    /// empty name clears the host.
    pub fn set_hostname(&mut self, name: &str) -> Result<(), Error> {
        if name.is_empty() {
            self.host = Host::None;
        } else if let Ok(ip) = name.parse::<Ipv4Addr>() {
            self.host = Host::Ip(ip);
        } else {
            let mut owned = String::new();
            owned.push_str(name).map_err(|_| Error::Truncated)?;
            self.host = Host::Name(owned);
        }
        Ok(())
    }

    /// Parses a full URL string.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut url = Url::new();
        let mut s = input;

        // A plain protocol-relative prefix.
        if let Some(rest) = s.strip_prefix("//") {
            s = rest;
        }
        // `scheme://` (the colon alone, as in `host:port`, is not one).
        if let Some(colon) = s.find(':') {
            if s.as_bytes().get(colon + 1..colon + 3) == Some(b"//".as_slice()) {
                url.protocol = Protocol::from_scheme(&s[..colon]);
                s = &s[colon + 3..];
            }
        }
        // Fragments never reach the stored object.
        if let Some(hash) = s.find('#') {
            s = &s[..hash];
        }

        let (authority, target) = match s.find('/') {
            Some(slash) => (&s[..slash], &s[slash..]),
            None => (s, ""),
        };
        // Userinfo is skipped, not kept.
        let hostport = match authority.split_once('@') {
            Some((_, host)) => host,
            None => authority,
        };
        let hostname = match hostport.split_once(':') {
            Some((host, port)) => {
                url.port = lenient_port(port);
                host
            }
            None => hostport,
        };
        url.set_hostname(hostname)?;
        url.parse_target(target)?;
        Ok(url)
    }

    /// Parses a request-target: `path[?query][#fragment]`. Replaces the
    /// stored path and appends query parameters.
    pub fn parse_target(&mut self, target: &str) -> Result<(), Error> {
        let t = target.trim_start();
        let t = match t.find('#') {
            Some(hash) => &t[..hash],
            None => t,
        };
        let (path, raw_query) = match t.find('?') {
            Some(q) => (&t[..q], &t[q + 1..]),
            None => (t, ""),
        };
        self.set_path(path)?;
        if !raw_query.is_empty() {
            self.query.parse_append(raw_query.as_bytes());
        }
        Ok(())
    }

    /// Serializes the URL. The port is emitted only when `show_port` is
    /// set and a port is present (and only alongside a host).
    pub fn write_to(
        &self,
        out: &mut dyn fmt::Write,
        show_port: bool,
    ) -> fmt::Result {
        if let Some(scheme) = self.protocol.scheme_str() {
            out.write_str(scheme)?;
            out.write_str("://")?;
        }
        let has_host = match &self.host {
            Host::None => false,
            Host::Name(name) => {
                out.write_str(name)?;
                true
            }
            Host::Ip(ip) => {
                write!(out, "{ip}")?;
                true
            }
        };
        if has_host && show_port && self.port != 0 {
            write!(out, ":{}", self.port)?;
        }
        out.write_str(&self.path)?;
        if !self.query.is_empty() {
            out.write_char('?')?;
            self.query.write_to(out)?;
        }
        Ok(())
    }
}

/// Decimal port with the permissive historical behavior: non-digit
/// characters are skipped rather than rejected.
fn lenient_port(text: &str) -> u16 {
    let mut port = 0u16;
    for byte in text.bytes() {
        if byte.is_ascii_digit() {
            port = port
                .wrapping_mul(10)
                .wrapping_add(u16::from(byte - b'0'));
        }
    }
    port
}
