//! Guest OS type table, as reported by `list --long ostypes`

use crate::error::{Error, Result};
use crate::vbox::parse::parse_long_list;
use std::collections::BTreeMap;

/// Bidirectional mapping between OS symbols (`linux26`) and VirtualBox IDs
/// (`Linux26`).
///
/// Symbols are the lowercased IDs. Lookups from the tool side accept the
/// ID, its lowercase form, or the human description (`Linux 2.6`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsTypes {
    ids: BTreeMap<String, String>,
    descriptions: BTreeMap<String, String>,
    symbols: BTreeMap<String, String>,
}

impl OsTypes {
    /// Builds the table from `list --long ostypes` output.
    pub fn from_list(output: &str) -> Self {
        Self::from_pairs(parse_long_list(output).into_iter().filter_map(|mut record| {
            let id = record.remove("ID")?;
            let description = record.remove("Description").unwrap_or_default();
            Some((id, description))
        }))
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut table = OsTypes::default();
        for (id, description) in pairs {
            let id = id.into();
            let description = description.into();
            let symbol = id.to_lowercase();

            table.symbols.insert(id.clone(), symbol.clone());
            table.symbols.insert(symbol.clone(), symbol.clone());
            if !description.is_empty() {
                table.symbols.insert(description.clone(), symbol.clone());
            }
            table.descriptions.insert(id.clone(), description);
            table.ids.insert(symbol, id);
        }
        table
    }

    /// VirtualBox ID for `os`; unknown values are rejected.
    pub fn tool_id(&self, os: &str) -> Result<&str> {
        self.symbols
            .get(os)
            .and_then(|symbol| self.ids.get(symbol))
            .map(String::as_str)
            .ok_or_else(|| Error::invalid("OS type", os))
    }

    /// Symbol for a VirtualBox ID or description.
    pub fn symbol(&self, id_or_description: &str) -> Option<&str> {
        self.symbols.get(id_or_description).map(String::as_str)
    }

    /// `(id, description)` pairs, ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptions.iter().map(|(id, d)| (id.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
