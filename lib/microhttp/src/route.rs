// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Path-based header-scheme routing.
//!
//! The scheme decides which request headers are retained during parsing
//! (see [`crate::request`]). Routes are exact path matches, first match
//! wins, with one twist: a trailing `index.<ext>` component is virtually
//! stripped before comparison, so `/` also covers `/index.html`.

use crate::{Error, MAX_ROUTES, PATH_MAX};
use bitflags::bitflags;
use heapless::{String, Vec};

bitflags! {
    /// Header-retention policy selector for a path.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Scheme: u8 {
        const HTTP_REQUEST = 1 << 0;
        const HTTP_RESPONSE = 1 << 1;
        const WS_REQUEST = 1 << 2;
        const WS_RESPONSE = 1 << 3;
    }
}

#[derive(Clone, Debug)]
struct Route {
    path: String<PATH_MAX>,
    scheme: Scheme,
}

/// Ordered routing table; configure with [`RouteTable::add`] before the
/// first parse.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route, MAX_ROUTES>,
}

impl RouteTable {
    pub const fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add(&mut self, path: &str, scheme: Scheme) -> Result<(), Error> {
        let mut owned = String::new();
        owned.push_str(path).map_err(|_| Error::Truncated)?;
        self.routes
            .push(Route {
                path: owned,
                scheme,
            })
            .map_err(|_| Error::Truncated)
    }

    /// Scheme for `path`; [`Scheme::HTTP_REQUEST`] when nothing matches.
    pub fn scheme_for(&self, path: &str) -> Scheme {
        let effective = strip_index_suffix(path);
        self.routes
            .iter()
            .find(|route| route.path.as_str() == effective)
            .map(|route| route.scheme)
            .unwrap_or(Scheme::HTTP_REQUEST)
    }
}

/// Cuts an `index.<ext>` tail (and the `/` before it, unless that slash
/// is the path root) so directory defaults route like their directory.
fn strip_index_suffix(path: &str) -> &str {
    match path.find("index.") {
        Some(at) => {
            if at >= 2 && path.as_bytes()[at - 1] == b'/' {
                &path[..at - 1]
            } else {
                &path[..at]
            }
        }
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_suffix_is_stripped() {
        let mut routes = RouteTable::new();
        routes.add("/", Scheme::WS_REQUEST).unwrap();
        assert_eq!(routes.scheme_for("/index.html"), Scheme::WS_REQUEST);
        assert_eq!(routes.scheme_for("/"), Scheme::WS_REQUEST);
    }

    #[test]
    fn nested_index_strips_its_slash() {
        let mut routes = RouteTable::new();
        routes.add("/app", Scheme::WS_REQUEST).unwrap();
        assert_eq!(routes.scheme_for("/app/index.htm"), Scheme::WS_REQUEST);
    }

    #[test]
    fn match_is_exact_not_prefix() {
        let mut routes = RouteTable::new();
        routes.add("/a", Scheme::WS_REQUEST).unwrap();
        assert_eq!(routes.scheme_for("/ab"), Scheme::HTTP_REQUEST);
        assert_eq!(routes.scheme_for("/a/b"), Scheme::HTTP_REQUEST);
    }

    #[test]
    fn first_match_wins() {
        let mut routes = RouteTable::new();
        routes
            .add("/x", Scheme::WS_REQUEST | Scheme::HTTP_REQUEST)
            .unwrap();
        routes.add("/x", Scheme::HTTP_RESPONSE).unwrap();
        assert_eq!(
            routes.scheme_for("/x"),
            Scheme::WS_REQUEST | Scheme::HTTP_REQUEST
        );
    }

    #[test]
    fn default_is_plain_http_request() {
        let routes = RouteTable::new();
        assert_eq!(routes.scheme_for("/anything"), Scheme::HTTP_REQUEST);
    }
}
