//! CSV encoding of batch values for PostgreSQL `COPY ... WITH (FORMAT csv)`.
//!
//! In COPY's CSV format an unquoted empty field is NULL, so empty strings
//! are always written quoted.

use crate::generate::value::Value;

/// Encode column-major values as CSV lines, one per row, without a header.
pub fn encode_rows(columns: &[Vec<Value>]) -> String {
    let rows = columns.first().map_or(0, |c| c.len());
    let mut out = String::with_capacity(rows * columns.len() * 12);
    for row in 0..rows {
        for (idx, column) in columns.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&csv_field(&column[row]));
        }
        out.push('\n');
    }
    out
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => {
            let s = other.to_csv_string();
            if s.is_empty() {
                "\"\"".to_string()
            } else {
                csv_escape(&s)
            }
        }
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape_plain() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_comma_and_quotes() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_null_and_empty_string_differ() {
        let columns = vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Null, Value::String("".into())],
        ];
        assert_eq!(encode_rows(&columns), "1,\n2,\"\"\n");
    }

    #[test]
    fn test_json_is_quoted() {
        let columns = vec![vec![Value::Json(serde_json::json!({"a": 1, "b": 2}))]];
        assert_eq!(encode_rows(&columns), "\"{\"\"a\"\":1,\"\"b\"\":2}\"\n");
    }
}
