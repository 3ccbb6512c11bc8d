use colored::Colorize;
use guestconf::{StructuredConfig, UpdateReport, Value, encode_value};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Config values
// ============================================================================

/// Render a value in its wire form, falling back to the debug form when it
/// cannot be encoded.
pub fn render_value(key: &str, value: &Value) -> String {
    match encode_value(key, value) {
        Ok(Some(encoded)) => encoded,
        Ok(None) => "(flag)".to_string(),
        Err(_) => format!("{value:?}"),
    }
}

/// Shorten a value for one-line display.
pub fn truncate(value: &str, max_len: usize) -> String {
    let first_line = value.lines().next().unwrap_or_default();
    let count = first_line.chars().count();
    if count <= max_len && first_line.len() == value.len() {
        first_line.to_string()
    } else {
        let kept: String = first_line.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

/// Print a decoded config as an aligned key/value table.
pub fn config_table(config: &StructuredConfig) {
    let width = config.keys().map(str::len).max().unwrap_or(0);
    for (key, value) in config.iter() {
        println!(
            "  {}  {} {}",
            format!("{key:width$}").bold(),
            truncate(&render_value(key, value), 100),
            format!("[{}]", value.kind()).dimmed()
        );
    }
}

/// Print the outcome of one update.
pub fn report(report: &UpdateReport) {
    if report.is_changed() {
        let mut keys: Vec<&str> = report.changed.iter().map(String::as_str).collect();
        keys.extend(report.deleted.iter().map(String::as_str));
        success(&format!("{}: changed {}", report.guest, keys.join(", ")));
    } else {
        info(&format!("{}: unchanged", report.guest));
    }
    for warning in &report.warnings {
        warn(&format!("{}: {warning}", report.guest));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestconf::Composite;

    #[test]
    fn test_render_value() {
        let net = Value::Composite(Composite::new().with("model", "virtio").with("bridge", "vmbr0"));
        assert_eq!(render_value("net0", &net), "model=virtio,bridge=vmbr0");
        assert_eq!(render_value("tags", &Value::tags(["a", "b"])), "a;b");
        assert_eq!(render_value("toggle", &Value::Flag), "(flag)");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("0123456789abc", 10), "012345678…");
        assert_eq!(truncate("first\nsecond", 20), "first…");
        assert_eq!(truncate("", 10), "");
    }
}
