//! Client-side table sorting.
//!
//! Sorting is stable, folds case and Latin diacritics, places `ñ` between
//! `n` and `o`, and keeps empty cells at the bottom in both directions.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Active sort column and direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column: String,
    pub direction: SortDirection,
}

/// Header click: same column flips direction, a new column starts ascending.
pub fn toggle(current: Option<&SortState>, column: &str) -> SortState {
    let direction = match current {
        Some(state) if state.column == column => state.direction.reversed(),
        _ => SortDirection::Asc,
    };
    SortState {
        column: column.to_string(),
        direction,
    }
}

/// Sortable cell content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Empty,
    Int(i64),
    Text(String),
}

impl CellValue {
    pub fn text(value: &str) -> Self {
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value.to_string())
        }
    }

    pub fn opt_text(value: Option<&str>) -> Self {
        value.map_or(Self::Empty, Self::text)
    }

    pub fn opt_int(value: Option<i64>) -> Self {
        value.map_or(Self::Empty, Self::Int)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Orders two non-empty cells. Numbers sort before text.
fn compare_values(left: &CellValue, right: &CellValue) -> Ordering {
    match (left, right) {
        (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
        (CellValue::Text(a), CellValue::Text(b)) => compare_text(a, b),
        (CellValue::Int(_), CellValue::Text(_)) => Ordering::Less,
        (CellValue::Text(_), CellValue::Int(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Spanish-aware text comparison.
pub fn compare_text(left: &str, right: &str) -> Ordering {
    collation_key(left).cmp(&collation_key(right))
}

fn collation_key(value: &str) -> Vec<u32> {
    let mut key = Vec::with_capacity(value.len());
    for ch in value.trim().chars().flat_map(char::to_lowercase) {
        // Weights are doubled so `ñ` fits between `n` and `o`.
        let weight = match ch {
            'ñ' => u32::from('n') * 2 + 1,
            other => u32::from(fold_diacritic(other)) * 2,
        };
        key.push(weight);
    }
    key
}

fn fold_diacritic(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ç' => 'c',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

type Accessor<T> = Box<dyn Fn(&T) -> CellValue + Send + Sync>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct TableColumn<T> {
    pub key: &'static str,
    pub label: &'static str,
    accessor: Accessor<T>,
    comparator: Option<Comparator<T>>,
}

impl<T> TableColumn<T> {
    pub fn new(
        key: &'static str,
        label: &'static str,
        accessor: impl Fn(&T) -> CellValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            label,
            accessor: Box::new(accessor),
            comparator: None,
        }
    }

    /// Replaces cell ordering with a custom comparison of whole rows.
    pub fn with_comparator(
        mut self,
        comparator: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    ) -> Self {
        self.comparator = Some(Box::new(comparator));
        self
    }

    pub fn value(&self, row: &T) -> CellValue {
        (self.accessor)(row)
    }
}

/// Column set for one table view.
pub struct TableSorter<T> {
    columns: Vec<TableColumn<T>>,
}

impl<T> TableSorter<T> {
    pub fn new(columns: Vec<TableColumn<T>>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[TableColumn<T>] {
        &self.columns
    }

    pub fn column(&self, key: &str) -> Option<&TableColumn<T>> {
        self.columns.iter().find(|column| column.key == key)
    }

    /// Sorts `rows` in place. Returns `false` for an unknown column.
    pub fn sort(&self, rows: &mut [T], column: &str, direction: SortDirection) -> bool {
        let Some(column) = self.column(column) else {
            return false;
        };

        if let Some(comparator) = &column.comparator {
            rows.sort_by(|a, b| direction.apply(comparator(a, b)));
            return true;
        }

        rows.sort_by(|a, b| {
            let left = column.value(a);
            let right = column.value(b);
            match (left.is_empty(), right.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => direction.apply(compare_values(&left, &right)),
            }
        });
        true
    }

    pub fn sort_with_state(&self, rows: &mut [T], state: &SortState) -> bool {
        self.sort(rows, &state.column, state.direction)
    }
}
