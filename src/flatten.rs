//! Nested dependency structures.
//!
//! A task may declare its requirements as a single task, a list, a map of
//! named tasks, or any nesting of those. The scheduler only cares about the
//! tasks themselves, so [`flatten`] reduces such a structure to a flat list.
//!
//! ```rust
//! use tsumiki::{Structure, flatten};
//!
//! let deps = Structure::list([
//!     Structure::leaf("foo"),
//!     Structure::leaves(["bar", "baz"]),
//! ]);
//!
//! assert_eq!(flatten(deps)?, ["foo", "bar", "baz"]);
//! # Ok::<(), tsumiki::FlattenError>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use crate::error::FlattenError;

/// A nested structure with leaves of type `T`.
pub enum Structure<T> {
    /// Nothing. Allowed at the top level only, where it stands for "no
    /// requirements at all".
    Absent,
    Leaf(T),
    /// Ordered sequence.
    List(Vec<Structure<T>>),
    /// Unordered sequence, flattened in the order given.
    Set(Vec<Structure<T>>),
    /// Only the values are flattened, in key order.
    Map(BTreeMap<String, Structure<T>>),
    /// A sequence produced on demand.
    Lazy(Box<dyn Iterator<Item = Structure<T>>>),
}

impl<T> Structure<T> {
    pub fn leaf(value: T) -> Self {
        Self::Leaf(value)
    }

    pub fn list(items: impl IntoIterator<Item = Structure<T>>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// An ordered sequence of leaves.
    pub fn leaves(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Self::Leaf).collect())
    }

    pub fn set(items: impl IntoIterator<Item = Structure<T>>) -> Self {
        Self::Set(items.into_iter().collect())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Structure<T>)>,
        K: Into<String>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn lazy<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Structure<T>>,
        I::IntoIter: 'static,
    {
        Self::Lazy(Box::new(items.into_iter()))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl<T> From<T> for Structure<T> {
    fn from(value: T) -> Self {
        Self::Leaf(value)
    }
}

impl<T> From<Vec<Structure<T>>> for Structure<T> {
    fn from(items: Vec<Structure<T>>) -> Self {
        Self::List(items)
    }
}

impl<T> From<BTreeMap<String, Structure<T>>> for Structure<T> {
    fn from(entries: BTreeMap<String, Structure<T>>) -> Self {
        Self::Map(entries)
    }
}

impl<T> From<HashMap<String, Structure<T>>> for Structure<T> {
    fn from(entries: HashMap<String, Structure<T>>) -> Self {
        Self::Map(entries.into_iter().collect())
    }
}

impl<T> From<Option<Structure<T>>> for Structure<T> {
    fn from(value: Option<Structure<T>>) -> Self {
        value.unwrap_or(Self::Absent)
    }
}

impl<T> Default for Structure<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Structure<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Leaf(value) => f.debug_tuple("Leaf").field(value).finish(),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Reduces a structure to its leaves.
///
/// A top-level [`Structure::Absent`] yields an empty list. An absent value
/// nested anywhere inside a container fails with [`FlattenError::Absent`],
/// a dependency list never silently drops an entry.
pub fn flatten<T>(structure: Structure<T>) -> Result<Vec<T>, FlattenError> {
    let mut acc = Vec::new();

    match structure {
        Structure::Absent => {}
        other => walk(other, &mut String::from("$"), &mut acc)?,
    }

    Ok(acc)
}

fn walk<T>(
    structure: Structure<T>,
    path: &mut String,
    acc: &mut Vec<T>,
) -> Result<(), FlattenError> {
    match structure {
        Structure::Absent => {
            return Err(FlattenError::Absent { path: path.clone() });
        }
        Structure::Leaf(value) => acc.push(value),
        Structure::List(items) | Structure::Set(items) => {
            for (i, item) in items.into_iter().enumerate() {
                nested(path, |p| write!(p, "[{i}]"), |p| walk(item, p, acc))?;
            }
        }
        Structure::Lazy(items) => {
            for (i, item) in items.enumerate() {
                nested(path, |p| write!(p, "[{i}]"), |p| walk(item, p, acc))?;
            }
        }
        Structure::Map(entries) => {
            for (key, item) in entries {
                nested(path, |p| write!(p, ".{key}"), |p| walk(item, p, acc))?;
            }
        }
    }

    Ok(())
}

/// Runs `f` with a path segment pushed, popping it afterwards.
fn nested<F, W>(path: &mut String, segment: W, f: F) -> Result<(), FlattenError>
where
    W: FnOnce(&mut String) -> std::fmt::Result,
    F: FnOnce(&mut String) -> Result<(), FlattenError>,
{
    let len = path.len();
    // Writing into a String can't fail.
    let _ = segment(path);
    let result = f(path);
    path.truncate(len);
    result
}
