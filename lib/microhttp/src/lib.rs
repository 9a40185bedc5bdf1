// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! URL and HTTP/1.x text handling for a small embedded client/server.
//!
//! Everything here is allocation-free: parsed objects own their bytes in
//! fixed-capacity containers, and serialization goes through
//! [`core::fmt::Write`] so output can target a bounded string, a frame
//! buffer, or anything else. Inputs that exceed a capacity fail with
//! [`Error::Truncated`] rather than overrunning.
//!
//! The pieces:
//!
//! - [`url`]: the URL model (scheme, host, port, path, query) with parse
//!   and serialize;
//! - [`query`]: ordered query-parameter list and percent-coding rules;
//! - [`header`]: ordered header-field list, unique by case-insensitive
//!   name;
//! - [`route`]: path-to-header-scheme routing table, which decides which
//!   request headers are worth keeping;
//! - [`request`]: HTTP request head parsing and generation.

#![cfg_attr(not(test), no_std)]

pub mod header;
pub mod percent;
pub mod query;
pub mod request;
pub mod route;
pub mod url;

pub use header::{HeaderField, HeaderList};
pub use query::{QueryList, QueryParam};
pub use request::{Connection, Method, Request};
pub use route::{RouteTable, Scheme};
pub use url::{Host, Protocol, Url};

/// Longest hostname a [`Url`] can hold.
pub const HOST_MAX: usize = 64;
/// Longest path a [`Url`] can hold.
pub const PATH_MAX: usize = 128;

/// Query list capacity and per-parameter limits (decoded bytes).
pub const MAX_QUERY_PARAMS: usize = 16;
pub const QUERY_NAME_MAX: usize = 32;
pub const QUERY_VALUE_MAX: usize = 96;

/// Header list capacity and per-field limits. Only headers retained by
/// the active scheme are stored, so the list stays small.
pub const MAX_HEADERS: usize = 8;
pub const HEADER_NAME_MAX: usize = 32;
pub const HEADER_VALUE_MAX: usize = 96;

/// Routing table capacity.
pub const MAX_ROUTES: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Input ended mid-construct, or a fixed-capacity container filled.
    Truncated,
    /// Syntactically invalid input (for example a bad percent escape).
    Malformed,
}
