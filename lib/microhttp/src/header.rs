// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered HTTP header-field list.
//!
//! Fields keep first-added order and are unique by case-insensitive
//! name; adding an existing name overwrites the value in place and keeps
//! the original name spelling. The list owns copies of everything it is
//! given.

use crate::{Error, HEADER_NAME_MAX, HEADER_VALUE_MAX, MAX_HEADERS};
use core::fmt;
use heapless::{String, Vec};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    name: String<HEADER_NAME_MAX>,
    value: String<HEADER_VALUE_MAX>,
}

impl HeaderField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Emits `Name: value`, without a line terminator; the caller owns
    /// the framing.
    pub fn write_to(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str(&self.name)?;
        out.write_str(": ")?;
        out.write_str(&self.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<HeaderField, MAX_HEADERS>,
}

impl HeaderList {
    pub const fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.position(name).map(|at| &self.fields[at])
    }

    /// Adds a field, copying both strings. An existing name (compared
    /// case-insensitively) has its value overwritten instead.
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let mut owned_value = String::new();
        owned_value.push_str(value).map_err(|_| Error::Truncated)?;
        match self.position(name) {
            Some(at) => {
                self.fields[at].value = owned_value;
                Ok(())
            }
            None => {
                let mut owned_name = String::new();
                owned_name.push_str(name).map_err(|_| Error::Truncated)?;
                self.fields
                    .push(HeaderField {
                        name: owned_name,
                        value: owned_value,
                    })
                    .map_err(|_| Error::Truncated)
            }
        }
    }

    /// Unlinks the field for `name`, if present.
    pub fn remove(&mut self, name: &str) {
        if let Some(at) = self.position(name) {
            self.fields[at..].rotate_left(1);
            self.fields.pop();
        }
    }
}
