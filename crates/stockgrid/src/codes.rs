//! Human-readable codes shown in stock tables.
//!
//! Products and stock transactions are numbered with zero-padded sequence
//! numbers behind a fixed prefix, e.g. `PRD-012-003-001-002` or `TRI-1042`.
//!
//! ```
//! use stockgrid::codes::{TransactionKind, format_index, product_code, transaction_code};
//!
//! assert_eq!(format_index(7), "007");
//! assert_eq!(product_code(12, Some(3), Some(1), None), "PRD-012-003-001-000");
//! assert_eq!(transaction_code(TransactionKind::Out, 1042), "TRO-1042");
//! ```

use std::fmt;

/// Zero-pad a sequence number to three digits, or four above 999.
///
/// Numbers wider than that are printed as is.
pub fn format_index(num: u64) -> String {
    if num > 999 {
        format!("{num:04}")
    } else {
        format!("{num:03}")
    }
}

/// Product code `PRD-<num>-<brand>-<category>-<unit>`. Missing references
/// are written as `000`.
pub fn product_code(
    num: u64,
    brand_id: Option<u64>,
    category_id: Option<u64>,
    unit_id: Option<u64>,
) -> String {
    format!(
        "PRD-{}-{}-{}-{}",
        format_index(num),
        format_index(brand_id.unwrap_or(0)),
        format_index(category_id.unwrap_or(0)),
        format_index(unit_id.unwrap_or(0)),
    )
}

/// Direction of a stock transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    /// Goods received.
    In,
    /// Goods issued.
    Out,
    /// Goods moved between places.
    Mutation,
}

impl TransactionKind {
    /// The code prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::In => "TRI",
            Self::Out => "TRO",
            Self::Mutation => "TRM",
        }
    }
}

/// Transaction code `<prefix>-<num>`.
pub fn transaction_code(kind: TransactionKind, num: u64) -> String {
    format!("{}-{}", kind.prefix(), format_index(num))
}

/// Where a product is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductPlace {
    /// The central warehouse.
    Warehouse,
    /// A named store.
    Store(String),
    /// Neither was recorded.
    Unknown,
}

impl ProductPlace {
    /// Resolve the place from a record's warehouse flag and store reference.
    /// The warehouse flag wins.
    pub fn resolve(to_warehouse: bool, store_name: Option<&str>) -> Self {
        match (to_warehouse, store_name) {
            (true, _) => Self::Warehouse,
            (false, Some(name)) => Self::Store(name.to_string()),
            (false, None) => Self::Unknown,
        }
    }
}

impl fmt::Display for ProductPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warehouse => f.write_str("Gudang"),
            Self::Store(name) => f.write_str(name),
            Self::Unknown => f.write_str("Tidak diketahui"),
        }
    }
}
