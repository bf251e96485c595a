//! Shared helper functions for CLI commands.

use console::style;
use serde_json::Value;

use crate::report::Envelope;

/// Truncate a string to `max` characters, appending an ellipsis if cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

/// Print a short human summary to stderr and the envelope JSON to stdout.
///
/// Returns whether the envelope reported success.
pub fn print_envelope(envelope: &Envelope, compact: bool) -> anyhow::Result<bool> {
    let json = envelope.to_json();
    print_summary(&json);

    let rendered = if compact {
        serde_json::to_string(&json)?
    } else {
        serde_json::to_string_pretty(&json)?
    };
    println!("{}", rendered);
    Ok(envelope.is_ok())
}

fn print_summary(json: &Value) {
    let took = json["tookMs"].as_u64().unwrap_or_default();

    if json["ok"] != Value::Bool(true) {
        eprintln!(
            "{} {} ({}ms)",
            style("✗").red(),
            json["error"].as_str().unwrap_or("unknown error"),
            took
        );
        if let Some(stage) = json["diag"]["stage"].as_str() {
            eprintln!("{:<12} {}", "  stage:", stage);
        }
        return;
    }

    if json.get("ping").is_some() {
        eprintln!("{} Configuration looks good", style("✓").green());
        return;
    }

    if let Some(len) = json["diag"]["len"].as_u64() {
        eprintln!(
            "{} Fetched {} bytes from {}",
            style("✓").green(),
            len,
            json["diag"]["url"].as_str().unwrap_or_default()
        );
        return;
    }

    eprintln!(
        "\n{} {} ({}ms)",
        style("Store sales").bold(),
        json["period"]["from"].as_str().unwrap_or_default(),
        took
    );
    eprintln!("{}", "-".repeat(50));
    if let Some(groups) = json["groups"].as_object() {
        for (name, group) in groups {
            eprintln!(
                "{:<12} {:>6} orders  {:>12.2}",
                style(name).cyan(),
                group["totals"]["orders"].as_u64().unwrap_or_default(),
                group["totals"]["sales"].as_f64().unwrap_or_default()
            );
            for row in group["rows"].as_array().into_iter().flatten() {
                eprintln!(
                    "  {:<30} {:>6}  {:>12.2}",
                    truncate(row["store"].as_str().unwrap_or_default(), 30),
                    row["orders"].as_u64().unwrap_or_default(),
                    row["sales"].as_f64().unwrap_or_default()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("MELI Loja Oficial Centro", 10), "MELI Loja…");
        assert_eq!(truncate("Vendas válidas", 14), "Vendas válidas");
    }
}
