use anyhow::{Context as _, Result};
use guestconf::Coordinator;

use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::planner::BatchFile;
use crate::engine::{check, execute_batch};
use crate::paths;
use crate::progress::BatchProgress;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let path = paths::expand(&args.file.to_string_lossy());
    let batch = BatchFile::load(&path)?;

    let source = super::source(ctx)?;
    let mut requests = Vec::with_capacity(batch.guests.len());
    for entry in &batch.guests {
        let guest = super::resolve(ctx, &source, entry.vmid, entry.node.as_deref(), entry.kind)?;
        let request = entry
            .request(guest)
            .with_context(|| format!("Invalid entry for guest {}", entry.vmid))?;
        requests.push(request);
    }

    if !ctx.quiet {
        ui::header(&format!("Batch {} ({} guests)", path.display(), requests.len()));
    }

    let progress = if ctx.quiet {
        BatchProgress::hidden()
    } else {
        BatchProgress::new(requests.len())
    };
    let bar = progress.bar();
    let coordinator = Coordinator::new(source).with_observer(progress);

    let mut opts = super::execute_options(ctx, args.write);
    if let Some(jobs) = args.jobs {
        opts.jobs = jobs;
    }

    let summary = execute_batch(&coordinator, &requests, &bar, &opts)?;
    check(&summary)
}
