use serde_json::Value;

/// Normalize a raw BBL cell to its decimal string form.
/// Numeric exports sometimes carry a trailing `.0`, which is dropped.
pub fn normalize_bbl(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some((whole, fraction)) = trimmed.split_once('.') {
        if !whole.is_empty()
            && whole.chars().all(|c| c.is_ascii_digit())
            && fraction.chars().all(|c| c == '0')
        {
            return Some(whole.to_string());
        }
    }

    Some(trimmed.to_string())
}

/// BBL from a GeoJSON property that may be a string or a number
pub fn bbl_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_bbl(s),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| format!("{:.0}", f))
            }
        }
        _ => None,
    }
}

/// Borough code from the first character of a BBL:
/// 1 Manhattan, 2 Bronx, 3 Brooklyn, 4 Queens, 5 Staten Island
pub fn borough_from_bbl(bbl: &str) -> Option<u8> {
    bbl.chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as u8)
}

/// Join street number and street name with a single space.
/// An absent part is left out; both absent gives `None`.
pub fn compose_address(street_number: Option<&str>, street_name: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [street_number, street_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Trimmed cell, `None` when blank
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Numeric GeoJSON property, accepting numbers stored as strings
pub fn f64_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_borough_from_bbl() {
        assert_eq!(borough_from_bbl("1034560001"), Some(1));
        assert_eq!(borough_from_bbl("5000010001"), Some(5));
        assert_eq!(borough_from_bbl("X0001"), None);
        assert_eq!(borough_from_bbl(""), None);
    }

    #[test]
    fn test_normalize_bbl() {
        assert_eq!(normalize_bbl(" 1000010001 "), Some("1000010001".to_string()));
        assert_eq!(normalize_bbl("1000010001.0"), Some("1000010001".to_string()));
        assert_eq!(normalize_bbl("1000010001.5"), Some("1000010001.5".to_string()));
        assert_eq!(normalize_bbl("   "), None);
    }

    #[test]
    fn test_bbl_from_json() {
        assert_eq!(bbl_from_json(&json!(1000010001u64)), Some("1000010001".to_string()));
        assert_eq!(bbl_from_json(&json!(1000010001.0)), Some("1000010001".to_string()));
        assert_eq!(bbl_from_json(&json!("2000010001")), Some("2000010001".to_string()));
        assert_eq!(bbl_from_json(&json!(null)), None);
    }

    #[test]
    fn test_compose_address() {
        assert_eq!(
            compose_address(Some("350"), Some("5 AVENUE")),
            Some("350 5 AVENUE".to_string())
        );
        assert_eq!(
            compose_address(None, Some("BROADWAY")),
            Some("BROADWAY".to_string())
        );
        assert_eq!(compose_address(Some(" "), None), None);
    }

    #[test]
    fn test_f64_from_json() {
        assert_eq!(f64_from_json(&json!(12.5)), Some(12.5));
        assert_eq!(f64_from_json(&json!("7")), Some(7.0));
        assert_eq!(f64_from_json(&json!("n/a")), None);
    }
}
