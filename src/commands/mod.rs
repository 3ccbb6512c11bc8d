pub mod apply;
pub mod config;
pub mod device;
pub mod inspect;
pub mod set;
pub mod show;

use anyhow::{Context as _, Result, bail};
use guestconf::{Coordinator, GuestKind, GuestRef, PveshSource};

use crate::Context;
use crate::cli::{GuestArgs, WriteArgs};
use crate::engine::ExecuteOptions;
use crate::paths;
use crate::progress::TerminalObserver;

/// Open the platform CLI source configured for this run.
pub fn source(ctx: &Context) -> Result<PveshSource> {
    match &ctx.config.source.pvesh {
        Some(path) => Ok(PveshSource::with_path(paths::expand(path).to_string_lossy())),
        None => PveshSource::new().context("Could not find pvesh"),
    }
}

/// Coordinator reporting to the terminal.
pub fn coordinator(ctx: &Context) -> Result<Coordinator<PveshSource>> {
    Ok(Coordinator::new(source(ctx)?).with_observer(TerminalObserver {
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
    }))
}

/// Resolve a guest from command line arguments.
pub fn resolve_guest(ctx: &Context, source: &PveshSource, args: &GuestArgs) -> Result<GuestRef> {
    resolve(ctx, source, args.vmid, args.node.as_deref(), args.kind.map(Into::into))
}

/// Resolve a guest from its id plus optional node and kind.
///
/// With both node and kind known the cluster is not queried; otherwise the
/// guest is located through the cluster resource list.
pub fn resolve(
    ctx: &Context,
    source: &PveshSource,
    vmid: u32,
    node: Option<&str>,
    kind: Option<GuestKind>,
) -> Result<GuestRef> {
    let default_node = ctx.config.source.node.as_deref();

    if let (Some(node), Some(kind)) = (node.or(default_node), kind) {
        return Ok(GuestRef::new(node, kind, vmid));
    }

    let located = source
        .locate(vmid)
        .with_context(|| format!("Could not locate guest {vmid}"))?;
    if let Some(node) = node
        && node != located.node
    {
        bail!("Guest {vmid} is on node {}, not {node}", located.node);
    }
    if let Some(kind) = kind
        && kind != located.kind
    {
        bail!("Guest {vmid} is a {}, not a {kind}", located.kind);
    }
    Ok(located)
}

/// Execution options from the command line and config.
pub fn execute_options(ctx: &Context, write: WriteArgs) -> ExecuteOptions {
    let mut retry = ctx.config.update.retry();
    if let Some(retries) = write.retries {
        retry.max_attempts = retries.saturating_add(1);
    }
    ExecuteOptions {
        dry_run: write.dry_run,
        yes: write.yes || !ctx.config.update.confirm,
        retry,
        jobs: ctx.config.update.jobs,
        quiet: ctx.quiet,
    }
}
