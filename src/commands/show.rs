use anyhow::{Context as _, Result};
use guestconf::{ConfigSource, RawConfig, StructuredConfig, decode_lenient};
use serde::Serialize;

use crate::Context;
use crate::cli::ShowArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ShowArgs) -> Result<()> {
    let source = super::source(ctx)?;
    let guest = super::resolve_guest(ctx, &source, &args.guest)?;
    let raw = source
        .fetch(&guest)
        .with_context(|| format!("Could not read config of {guest}"))?;

    if args.raw {
        ui::header(&guest.to_string());
        let raw = filter_raw(&raw, &args.keys);
        for (key, value) in raw.iter() {
            ui::kv(key, value);
        }
        for flag in raw.flags() {
            ui::kv(flag, "(flag)");
        }
        return Ok(());
    }

    if !args.json {
        ui::header(&guest.to_string());
    }
    print_decoded(&raw, &args.keys, args.json)
}

#[derive(Serialize)]
struct DecodedOutput<'a> {
    config: &'a StructuredConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

/// Decode leniently and print, listing keys that failed to decode.
pub fn print_decoded(raw: &RawConfig, keys: &[String], json: bool) -> Result<()> {
    let (config, errors) = decode_lenient(raw);
    let config = if keys.is_empty() {
        config
    } else {
        config.subset(keys.iter().map(String::as_str))
    };
    let errors: Vec<String> = errors
        .iter()
        .filter(|e| keys.is_empty() || keys.contains(&e.key))
        .map(ToString::to_string)
        .collect();

    if json {
        let output = DecodedOutput {
            config: &config,
            digest: raw.digest.as_deref(),
            errors,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    ui::config_table(&config);
    if let Some(digest) = &raw.digest {
        println!();
        ui::dim(&format!("digest {digest}"));
    }
    if !errors.is_empty() {
        ui::section("Undecodable keys");
        for error in &errors {
            ui::warn(error);
        }
    }
    Ok(())
}

fn filter_raw(raw: &RawConfig, keys: &[String]) -> RawConfig {
    if keys.is_empty() {
        return raw.clone();
    }
    let mut filtered = RawConfig::new();
    for key in keys {
        if let Some(value) = raw.get(key) {
            filtered.insert(key.as_str(), value);
        } else if raw.is_flag(key) {
            filtered.insert_flag(key.as_str());
        }
    }
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_raw() {
        let mut raw = RawConfig::new().with("memory", "2048").with("cores", "2");
        raw.insert_flag("toggle");

        let filtered = filter_raw(&raw, &["memory".into(), "toggle".into(), "absent".into()]);
        assert_eq!(filtered.get("memory"), Some("2048"));
        assert!(filtered.is_flag("toggle"));
        assert!(!filtered.contains_key("cores"));
        assert_eq!(filter_raw(&raw, &[]), raw);
    }
}
