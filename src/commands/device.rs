use anyhow::{Result, bail};
use guestconf::{GuestKind, IpConfig, StorageDevice};

use crate::Context;
use crate::cli::{CdromArgs, DiskArgs, NetArgs};
use crate::engine::planner::{self, NetOptions};
use crate::engine::execute;
use crate::ui;

pub fn net(ctx: &Context, args: NetArgs) -> Result<()> {
    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;
    if guest.kind != GuestKind::Qemu {
        bail!("{guest}: net only configures VM interfaces; use `pvekit set` for containers");
    }

    let options = NetOptions {
        model: args.model,
        bridge: args.bridge,
        tag: args.tag,
        trunks: args
            .trunks
            .as_deref()
            .map(planner::parse_vlans)
            .transpose()?
            .unwrap_or_default(),
        firewall: args.firewall,
        ip: IpConfig {
            ip: args.ip,
            gw: args.gw,
            ip6: args.ip6,
            gw6: args.gw6,
        },
    };

    let snapshot = coordinator.read(&guest)?;
    let key = format!("net{}", args.index);
    let request = planner::net_request(guest, args.index, &options, snapshot.config.get(&key))?;
    let request = match snapshot.digest {
        Some(digest) => request.expect_digest(digest),
        None => request,
    };

    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}

pub fn disk(ctx: &Context, args: DiskArgs) -> Result<()> {
    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;

    let mut device = StorageDevice::allocate(&args.storage, args.size);
    if let Some(cache) = args.cache {
        device = device.with_option("cache", cache);
    }
    if !args.no_discard {
        device = device.with_option("discard", "on");
    }

    let snapshot = coordinator.read(&guest)?;
    let key = format!("scsi{}", args.index);
    let Some(request) = planner::disk_request(guest, args.index, device, snapshot.config.get(&key))?
    else {
        ui::info(&format!("{}: {key} already present, unchanged", snapshot.guest));
        return Ok(());
    };
    let request = match snapshot.digest {
        Some(digest) => request.expect_digest(digest),
        None => request,
    };

    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}

pub fn cdrom(ctx: &Context, args: CdromArgs) -> Result<()> {
    let coordinator = super::coordinator(ctx)?;
    let guest = super::resolve_guest(ctx, coordinator.source(), &args.guest)?;
    if guest.kind != GuestKind::Qemu {
        bail!("{guest}: containers have no CD-ROM drives");
    }

    let request = planner::cdrom_request(guest, &args.device, &args.storage, &args.file)?;
    execute(&coordinator, &request, &super::execute_options(ctx, args.write))?;
    Ok(())
}
