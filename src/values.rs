use serde_json::Value;

/// Coerces a spreadsheet cell into a number.
///
/// Formatted strings such as `"1,234.5%"` lose their `%` and `,` before parsing.
/// Anything that still fails to parse is logged and read as zero so one bad
/// cell never aborts a dashboard computation.
pub fn parse_cell(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => parse_text(text),
        Some(_) => 0.0,
    }
}

fn parse_text(raw: &str) -> f64 {
    let cleaned: String = raw.chars().filter(|c| *c != '%' && *c != ',').collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "-" {
        return 0.0;
    }

    match cleaned.parse::<f64>() {
        Ok(number) if number.is_finite() => number,
        Ok(_) => {
            tracing::warn!(cell = raw, "non-finite cell value, reading as 0");
            0.0
        }
        Err(error) => {
            tracing::warn!(cell = raw, error = %error, "failed to parse cell value, reading as 0");
            0.0
        }
    }
}
