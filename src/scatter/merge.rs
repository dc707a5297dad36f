//! Sort-merge of per-shard result rows
//!
//! Rows are ordered by their `id` field only. Descending order is produced by
//! reversing the ascending sort, not by flipping the comparator.

use crate::options::Row;
use std::cmp::Ordering;
use tracing::warn;

/// Merged rows from one shard set
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub rows: Vec<Row>,
    /// Rows could not be ordered and are returned in arrival order
    pub degraded: bool,
}

enum SortKey<'a> {
    Str(&'a str),
    Num(f64),
}

fn sort_key(row: &Row) -> Option<SortKey<'_>> {
    match row.get("id")? {
        Row::String(s) => Some(SortKey::Str(s)),
        Row::Number(n) => n.as_f64().map(SortKey::Num),
        _ => None,
    }
}

/// Ids must all be strings or all be numbers to be comparable
fn sorted(rows: &[Row]) -> Option<Vec<usize>> {
    let keys = rows.iter().map(sort_key).collect::<Option<Vec<_>>>()?;
    let uniform = keys.windows(2).all(|pair| {
        matches!(
            pair,
            [SortKey::Str(_), SortKey::Str(_)] | [SortKey::Num(_), SortKey::Num(_)]
        )
    });
    if !uniform {
        return None;
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| match (&keys[a], &keys[b]) {
        (SortKey::Str(x), SortKey::Str(y)) => x.cmp(y),
        (SortKey::Num(x), SortKey::Num(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    });
    Some(order)
}

/// Flatten row sets, order them by id, then drop `skip` rows and keep at
/// most `take`.
///
/// Rows without a usable id cannot be ordered; the merge then degrades to the
/// flattened arrival order instead of failing the operation.
pub fn merge(
    row_sets: Vec<Vec<Row>>,
    descending: bool,
    skip: usize,
    take: Option<usize>,
) -> Merged {
    let flat: Vec<Row> = row_sets.into_iter().flatten().collect();

    let (mut rows, degraded) = match sorted(&flat) {
        Some(order) => {
            let mut slots: Vec<Option<Row>> = flat.into_iter().map(Some).collect();
            let mut rows: Vec<Row> = order.into_iter().filter_map(|i| slots[i].take()).collect();
            if descending {
                rows.reverse();
            }
            (rows, false)
        }
        None => {
            warn!(rows = flat.len(), "Rows without comparable ids, returning unsorted merge");
            (flat, true)
        }
    };

    let skip = skip.min(rows.len());
    rows.drain(..skip);
    if let Some(take) = take {
        rows.truncate(take);
    }

    Merged { rows, degraded }
}
