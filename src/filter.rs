/*!
 * Filter-set loading for NPI and billing-code filter files
 *
 * Filter files are plain delimited text: one header line (dropped
 * unread), then comma-separated identifier rows. Loading normalizes
 * every row into a [`FilterKey`] and collapses duplicates, so a job's
 * filter set is a plain value-equality lookup for the flattener.
 *
 * Two policies coexist and are kept deliberately distinct:
 * [`FilterSet::from_csv`] is permissive (integers, string tokens, and
 * ordered tuples for composite keys), while [`FilterSet::from_npi_csv`]
 * accepts only integer NPIs, logging and dropping anything else.
 * Malformed rows never fail a load; only an unopenable file does.
 */

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;

use crate::constants::DEFAULT_READ_BUFFER_SIZE;
use crate::{MrfError, Result};

/// A normalized filter identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterKey {
    /// Purely numeric identifier (an NPI or other integer code)
    Npi(u64),
    /// Single non-numeric token (a billing code, an arrangement name)
    Code(String),
    /// Ordered multi-column key (such as billing code type + code)
    Composite(Vec<String>),
}

/// Immutable, normalized set of identifiers loaded from one filter file.
///
/// ```no_run
/// use mrf::prelude::*;
///
/// # fn main() -> mrf::Result<()> {
/// let npis = FilterSet::from_npi_csv("npi_list.csv")?;
/// println!("loaded {} NPIs", npis.len());
/// assert!(npis.contains_npi(1234567890) || npis.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    keys: HashSet<FilterKey>,
}

impl FilterSet {
    /// Load a filter file under the permissive policy.
    ///
    /// Each row splits on commas, fields are trimmed, empty fields are
    /// dropped, and lines that become entirely empty are skipped. A
    /// single purely-numeric field normalizes to [`FilterKey::Npi`], a
    /// single non-numeric field to [`FilterKey::Code`], and multiple
    /// fields to [`FilterKey::Composite`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut keys = HashSet::new();
        for fields in read_rows(path.as_ref())? {
            keys.insert(normalize_permissive(fields));
        }
        Ok(Self { keys })
    }

    /// Load an NPI-only filter file under the strict policy.
    ///
    /// Only the first field of each row is considered and it must parse
    /// as an integer; rows that fail conversion are logged and dropped.
    /// Tuple-shaped rows are coerced by taking their first element. The
    /// result contains only [`FilterKey::Npi`] entries.
    pub fn from_npi_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut keys = HashSet::new();
        for fields in read_rows(path)? {
            match fields[0].parse::<u64>() {
                Ok(npi) => {
                    keys.insert(FilterKey::Npi(npi));
                }
                Err(_) => {
                    tracing::warn!(
                        file = %path.display(),
                        value = %fields[0],
                        "dropping filter row with non-numeric NPI"
                    );
                }
            }
        }
        Ok(Self { keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &FilterKey) -> bool {
        self.keys.contains(key)
    }

    /// Membership check for the integer-NPI fast path
    pub fn contains_npi(&self, npi: u64) -> bool {
        self.keys.contains(&FilterKey::Npi(npi))
    }

    /// Membership check for single-token codes
    pub fn contains_code(&self, code: &str) -> bool {
        self.keys.contains(&FilterKey::Code(code.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterKey> {
        self.keys.iter()
    }
}

/// Read a filter file into trimmed, non-empty field rows.
///
/// The header line is discarded unvalidated. Rows the CSV layer cannot
/// parse at all are logged and skipped rather than surfaced; only a file
/// that cannot be opened produces an error.
fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MrfError::file_not_found(path.to_path_buf())
        } else {
            MrfError::Io {
                message: format!("cannot open filter file '{}': {}", path.display(), e),
                source: e,
            }
        }
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::with_capacity(DEFAULT_READ_BUFFER_SIZE, file));

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unparseable filter row");
                continue;
            }
        };
        let fields: Vec<String> = record
            .iter()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect();
        if fields.is_empty() {
            continue;
        }
        rows.push(fields);
    }
    Ok(rows)
}

fn normalize_permissive(mut fields: Vec<String>) -> FilterKey {
    if fields.len() > 1 {
        return FilterKey::Composite(fields);
    }
    let field = fields.pop().unwrap_or_default();
    if field.chars().all(|c| c.is_ascii_digit()) {
        // numeric tokens too long for u64 stay strings
        match field.parse::<u64>() {
            Ok(value) => FilterKey::Npi(value),
            Err(_) => FilterKey::Code(field),
        }
    } else {
        FilterKey::Code(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_filter(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_permissive_normalizes_ints_strings_and_tuples() {
        let file = write_filter("npi\n1234567890\nG0008\nCPT, 99213\n");
        let set = FilterSet::from_csv(file.path()).unwrap();

        assert_eq!(set.len(), 3);
        assert!(set.contains_npi(1234567890));
        assert!(set.contains_code("G0008"));
        assert!(set.contains(&FilterKey::Composite(vec!["CPT".into(), "99213".into()])));
    }

    #[test]
    fn test_permissive_trims_and_drops_empty_fields() {
        let file = write_filter("code_type,code\n CPT , 99213 \n,,\n\n  ,G0008,\n");
        let set = FilterSet::from_csv(file.path()).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(&FilterKey::Composite(vec!["CPT".into(), "99213".into()])));
        // row with only one surviving field is a single token, not a tuple
        assert!(set.contains_code("G0008"));
    }

    #[test]
    fn test_header_is_always_dropped() {
        // header looks like a valid NPI but must never land in the set
        let file = write_filter("1111111111\n2222222222\n");
        let set = FilterSet::from_csv(file.path()).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains_npi(2222222222));
        assert!(!set.contains_npi(1111111111));
    }

    #[test]
    fn test_duplicates_collapse_by_value() {
        let file = write_filter("npi\n1234567890\n1234567890\n 1234567890 \n");
        let set = FilterSet::from_csv(file.path()).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_size_matches_valid_deduplicated_rows() {
        let file = write_filter("npi\n1003000126\n1003000134\n1003000126\n\nbad row, ok\n");
        let set = FilterSet::from_csv(file.path()).unwrap();
        // 2 unique NPIs + 1 composite
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_oversized_numeric_token_stays_string() {
        let file = write_filter("id\n99999999999999999999999999\n");
        let set = FilterSet::from_csv(file.path()).unwrap();
        assert!(set.contains_code("99999999999999999999999999"));
    }

    #[test]
    fn test_strict_npi_load_keeps_only_integers() {
        let file = write_filter("npi\n1234567890\nnot-an-npi\n9876543210\n");
        let set = FilterSet::from_npi_csv(file.path()).unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains_npi(1234567890));
        assert!(set.contains_npi(9876543210));
        assert!(!set.contains_code("not-an-npi"));
    }

    #[test]
    fn test_strict_npi_load_coerces_tuple_rows() {
        let file = write_filter("npi,name\n1234567890,Dr. Example\nG0008,whatever\n");
        let set = FilterSet::from_npi_csv(file.path()).unwrap();

        assert_eq!(set.len(), 1);
        assert!(set.contains_npi(1234567890));
    }

    #[test]
    fn test_unopenable_file_raises() {
        let result = FilterSet::from_csv("no/such/filter.csv");
        assert!(matches!(result, Err(MrfError::FileNotFound { .. })));
    }

    #[test]
    fn test_empty_file_yields_empty_set() {
        let file = write_filter("npi\n");
        let set = FilterSet::from_csv(file.path()).unwrap();
        assert!(set.is_empty());
    }
}
