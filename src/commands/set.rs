use anyhow::{Context as _, Result, bail};
use guestconf::{UpdateRequest, Value};
use std::fs;

use crate::Context;
use crate::cli::{DescriptionArgs, SetArgs, TagsArgs};
use crate::engine::{execute, planner};
use crate::paths;

pub fn set(ctx: &Context, args: SetArgs) -> Result<()> {
    if args.assignments.is_empty() && args.delete.is_empty() {
        bail!("Nothing to do: give KEY=VALUE pairs or --delete KEY");
    }

    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;

    let mut request = UpdateRequest::new(guest);
    for assignment in &args.assignments {
        let (key, value) = planner::parse_assignment(assignment)?;
        request = request.set(key, value);
    }
    for key in args.delete {
        request = request.delete(key);
    }
    if let Some(digest) = args.digest {
        request = request.expect_digest(digest);
    }

    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}

pub fn tags(ctx: &Context, args: TagsArgs) -> Result<()> {
    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;

    let tags = planner::parse_tags(&args.tags);
    let request = if args.clear || tags.is_empty() {
        UpdateRequest::new(guest).delete("tags")
    } else {
        UpdateRequest::new(guest).set("tags", Value::tags(tags))
    };

    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}

pub fn description(ctx: &Context, args: DescriptionArgs) -> Result<()> {
    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;

    let text = match (args.text, args.file) {
        _ if args.clear => None,
        (Some(text), _) => Some(text),
        (None, Some(file)) => {
            let path = paths::expand(&file.to_string_lossy());
            Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("Could not read {}", path.display()))?,
            )
        }
        (None, None) => None,
    };

    let request = match text {
        Some(text) if !text.trim().is_empty() => {
            UpdateRequest::new(guest).set("description", text.trim_end())
        }
        _ => UpdateRequest::new(guest).delete("description"),
    };

    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}
