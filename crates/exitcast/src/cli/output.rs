//! Stage summary output
//!
//! Text mode prints an indented `key: value` listing; `--json` prints the
//! summary as pretty JSON on stdout.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Print a stage summary.
pub fn print_summary<T: Serialize>(title: &str, summary: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print!("{}", render_text(title, &serde_json::to_value(summary)?));
    }
    Ok(())
}

fn render_text(title: &str, value: &Value) -> String {
    let mut out = format!("{}\n", title);
    render_value(value, 1, &mut out);
    out
}

fn render_value(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                match inner {
                    Value::Object(_) => {
                        out.push_str(&format!("{}{}:\n", indent, key));
                        render_value(inner, depth + 1, out);
                    }
                    _ => out.push_str(&format!("{}{}: {}\n", indent, key, scalar(inner))),
                }
            }
        }
        other => out.push_str(&format!("{}{}\n", indent, scalar(other))),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.is_empty() => "-".to_string(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
