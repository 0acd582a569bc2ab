//! Kubernetes resource quantity parsing
//!
//! Only what the claim size reconciliation needs: turn "8Gi", "500M",
//! "1.5Ti" or "1e9" into a comparable byte count.

use std::cmp::Ordering;

/// Parse a Kubernetes quantity into a value in base units.
///
/// Accepts binary suffixes (Ki..Ei), decimal suffixes (k..E, m for milli),
/// decimal exponents (e/E) and bare numbers. Fractions are allowed.
pub fn parse_quantity(quantity: &str) -> Result<f64, String> {
    let q = quantity.trim();
    if q.is_empty() {
        return Err("empty quantity".to_string());
    }

    let split = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid quantity: {quantity}"))?;

    let multiplier = match suffix {
        "" => 1.0,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        s if s.starts_with(['e', 'E']) => {
            let exp: i32 = s[1..]
                .parse()
                .map_err(|_| format!("invalid exponent in quantity: {quantity}"))?;
            10f64.powi(exp)
        }
        _ => return Err(format!("unknown suffix in quantity: {quantity}")),
    };

    Ok(value * multiplier)
}

/// Compare two quantities by value
pub fn compare_quantities(a: &str, b: &str) -> Result<Ordering, String> {
    let a = parse_quantity(a)?;
    let b = parse_quantity(b)?;
    Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_suffixes() {
        assert_eq!(parse_quantity("1Ki").unwrap(), 1024.0);
        assert_eq!(parse_quantity("8Gi").unwrap(), 8.0 * 1024.0 * 1024.0 * 1024.0);
        assert_eq!(parse_quantity("512Mi").unwrap(), 512.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn decimal_suffixes_and_exponents() {
        assert_eq!(parse_quantity("5G").unwrap(), 5e9);
        assert_eq!(parse_quantity("1e9").unwrap(), 1e9);
        assert_eq!(parse_quantity("1E3").unwrap(), 1e3);
        assert!((parse_quantity("100m").unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(parse_quantity("1073741824").unwrap(), 1073741824.0);
    }

    #[test]
    fn fractions() {
        assert_eq!(parse_quantity("1.5Gi").unwrap(), 1.5 * 1024.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("Gi").is_err());
        assert!(parse_quantity("10Qi").is_err());
        assert!(parse_quantity("ten").is_err());
    }

    #[test]
    fn compares_across_units() {
        assert_eq!(compare_quantities("5Gi", "8Gi").unwrap(), Ordering::Less);
        assert_eq!(compare_quantities("10Gi", "8Gi").unwrap(), Ordering::Greater);
        assert_eq!(compare_quantities("1Gi", "1024Mi").unwrap(), Ordering::Equal);
        // 1G (decimal) is smaller than 1Gi (binary)
        assert_eq!(compare_quantities("1G", "1Gi").unwrap(), Ordering::Less);
    }
}
