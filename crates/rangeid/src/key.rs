use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Range, Result, ranges_contain};

/// Categories whose nested ids may be stored on the object they extend.
const EXTENSION_CATEGORIES: [&str; 2] = ["tableextension", "enumextension"];

/// Range prepended for ids nested inside an object the application owns.
///
/// Fields and values of an application's own objects may use the low
/// `1..=49999` band in addition to the application's declared ranges.
pub const OWN_OBJECT_NESTED_RANGE: Range = Range {
    from: 1,
    to: 49_999,
    name: None,
};

/// The allocation domain an identifier belongs to.
///
/// A key is either a bare category (`table`) or a category qualified by the
/// id of the object that contains the allocated ids (`table_50000` for the
/// fields of table 50000). Uniqueness is enforced per key, never across keys.
///
/// Keys serialize to and from their textual form, which is how they appear in
/// the ledger document. Every constructor yields the key its text parses
/// back to, so two keys are equal exactly when their texts are.
///
/// # Example
///
/// ```
/// use rangeid::StorageKey;
///
/// let fields = StorageKey::nested("table", 50_000);
/// assert_eq!(fields.to_string(), "table_50000");
/// assert_eq!("table_50000".parse::<StorageKey>().unwrap(), fields);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct StorageKey {
    category: String,
    parent: Option<u32>,
}

impl StorageKey {
    /// Key for top-level objects of `category`.
    ///
    /// Text already shaped like a nested key is read as one:
    /// `object("table_5")` equals `nested("table", 5)`.
    pub fn object(category: impl Into<String>) -> Self {
        Self::from(category.into())
    }

    /// Key for ids nested inside object `parent` of `category`.
    pub fn nested(category: impl Into<String>, parent: u32) -> Self {
        Self {
            category: category.into(),
            parent: Some(parent),
        }
    }

    /// Rejects keys that cannot be stored in a ledger document.
    ///
    /// The category must be non-empty and must not start with `_`, which
    /// marks the ledger's own fields (`_ranges`, `_log`).
    pub fn validate(&self) -> Result<()> {
        if self.category.is_empty() || self.category.starts_with('_') {
            return Err(Error::InvalidKey(self.to_string()));
        }
        Ok(())
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    /// Returns `true` for `tableextension` and `enumextension` categories.
    pub fn is_extension(&self) -> bool {
        EXTENSION_CATEGORIES
            .iter()
            .any(|category| self.category.eq_ignore_ascii_case(category))
    }

    /// Stores ids nested in an extension on the extended object instead
    /// (`tableextension_X` becomes `table_X`).
    ///
    /// The parent id must already be the extended object's id; resolving it
    /// is the caller's concern.
    pub fn redirect_extension(self) -> Self {
        if !self.is_extension() {
            return self;
        }
        let len = self.category.len() - "extension".len();
        Self {
            category: self.category[..len].to_owned(),
            parent: self.parent,
        }
    }

    /// Ranges nested ids of this key may be allocated from.
    ///
    /// When the parent object itself lies inside `app_ranges` (the
    /// application owns it), [`OWN_OBJECT_NESTED_RANGE`] is tried first.
    /// Top-level keys and extensions use `app_ranges` unchanged.
    pub fn eligible_ranges(&self, app_ranges: &[Range]) -> Vec<Range> {
        match self.parent {
            Some(parent) if !self.is_extension() && ranges_contain(app_ranges, parent) => {
                core::iter::once(OWN_OBJECT_NESTED_RANGE)
                    .chain(app_ranges.iter().cloned())
                    .collect()
            }
            _ => app_ranges.to_vec(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{}_{parent}", self.category),
            None => f.write_str(&self.category),
        }
    }
}

impl FromStr for StorageKey {
    type Err = core::convert::Infallible;

    /// Splits on the last `_` when the suffix is a number written without
    /// leading zeros; anything else is a bare category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for StorageKey {
    fn from(value: String) -> Self {
        if let Some((category, suffix)) = value.rsplit_once('_') {
            if let Some(parent) = canonical_parent(suffix) {
                if !category.is_empty() {
                    return Self::nested(category, parent);
                }
            }
        }
        Self {
            category: value,
            parent: None,
        }
    }
}

/// Parses `suffix` only when formatting the number gives `suffix` back.
fn canonical_parent(suffix: &str) -> Option<u32> {
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let parent = suffix.parse::<u32>().ok()?;
    (parent.to_string() == suffix).then_some(parent)
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        match key.parent {
            Some(_) => key.to_string(),
            None => key.category,
        }
    }
}
