use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use guestconf::{RawConfig, registry};
use std::fs;
use std::io::{self, Read};

use crate::cli::DecodeArgs;
use crate::paths;
use crate::ui;

/// Decode a raw config from a JSON file or stdin, without touching a guest.
pub fn decode(args: DecodeArgs) -> Result<()> {
    let content = match &args.file {
        Some(file) => {
            let path = paths::expand(&file.to_string_lossy());
            fs::read_to_string(&path)
                .with_context(|| format!("Could not read {}", path.display()))?
        }
        None => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .context("Could not read stdin")?;
            content
        }
    };

    let raw = parse_raw(&content)?;
    super::show::print_decoded(&raw, &[], args.json)
}

/// Parse a config object, as printed by `pvesh get ... --output-format json`
/// or wrapped in the API's `{"data": {...}}` envelope.
fn parse_raw(content: &str) -> Result<RawConfig> {
    let json: serde_json::Value = serde_json::from_str(content).context("Invalid JSON")?;
    let object = match json.get("data") {
        Some(data) if data.is_object() && json.as_object().is_some_and(|o| o.len() == 1) => data,
        _ => &json,
    };
    match object.as_object() {
        Some(object) => Ok(RawConfig::from_json_object(object)),
        None => bail!("Expected a JSON object with config keys"),
    }
}

/// Print the field grammar tables.
pub fn grammar() {
    ui::header(&format!("Field grammar (revision {})", registry::REVISION));

    ui::section("Slot ranges");
    for range in registry::slot_ranges() {
        println!(
            "  {:<24} {}",
            format!("{}0..{}{}", range.prefix, range.prefix, range.count.saturating_sub(1)),
            range.family.to_string().dimmed()
        );
    }

    ui::section("Named keys");
    for (key, family) in registry::named_keys() {
        println!("  {key:<24} {}", family.to_string().dimmed());
    }

    ui::section("Free-form scalars (never split)");
    ui::dim(&registry::free_form_scalars().join(", "));

    ui::section("NIC models");
    ui::dim(&registry::valid_nic_models().join(", "));

    println!();
    ui::dim("Any other key is a scalar, split into a list or composite by its content.");
}
