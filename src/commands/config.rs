use anyhow::{Result, bail};

use crate::Context;
use crate::config::Config;
use crate::ui;

pub fn path(ctx: &Context) {
    println!("{}", ctx.config_path.display());
}

pub fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = &ctx.config_path;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    Config::default().save(path)?;
    ui::success(&format!("Wrote {}", path.display()));
    if !ctx.quiet {
        ui::dim("Set [source] node to skip locating guests through the cluster.");
    }
    Ok(())
}
