//! Currency Formatting
//!
//! Balances are integer subunits (grosze, cents). Display splits them into
//! major and minor parts without going through floating point.

/// Subunits in one major currency unit
pub const SUBUNITS_PER_UNIT: u64 = 100;

/// Format `subunits` as `<major>.<minor> <code>`, e.g. `-400.00 PLN`
pub fn format_currency(subunits: i64, code: &str) -> String {
    let sign = if subunits < 0 { "-" } else { "" };
    let abs = subunits.unsigned_abs();
    format!(
        "{}{}.{:02} {}",
        sign,
        abs / SUBUNITS_PER_UNIT,
        abs % SUBUNITS_PER_UNIT,
        code
    )
}
