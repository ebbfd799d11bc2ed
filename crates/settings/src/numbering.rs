//! Invoice display numbers: `prefix + zero-padded(sequence)`.

use serde::{Deserialize, Serialize};

/// Minimum digit count of the sequence part (`INV-001`).
pub const DEFAULT_NUMBER_WIDTH: usize = 3;

/// `format_invoice_number("INV-", 7)` is `"INV-007"`; wider sequences are never truncated.
pub fn format_invoice_number(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{sequence:0width$}", width = DEFAULT_NUMBER_WIDTH)
}

/// A reserved invoice number: the raw sequence and its display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber {
    pub sequence: u64,
    pub display: String,
}

impl InvoiceNumber {
    pub fn new(prefix: &str, sequence: u64) -> Self {
        Self {
            sequence,
            display: format_invoice_number(prefix, sequence),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl core::fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.display)
    }
}
