//! `devices` subcommand: list connected power boards.

use super::{Context, DevicesOutput, Result, device, load_config, print_json, session};

pub(super) fn cmd_devices(ctx: &Context) -> Result<()> {
    let config = load_config(ctx.config_path.as_deref());
    let boards = session::list_boards(&device::platform_backend(), &config.filter())?;

    if ctx.json {
        print_json(&DevicesOutput {
            count: boards.len(),
            devices: boards,
        });
        return Ok(());
    }

    if boards.is_empty() {
        println!(
            "No power boards found ({:04x}:{:04x}).",
            config.vendor_id, config.product_id
        );
        return Ok(());
    }

    for board in &boards {
        println!("Found: bus {}, device {}", board.bus, board.address);
        match &board.serial {
            Some(serial) => println!("  Serial: {serial}"),
            None => println!("  Serial: (cannot open device)"),
        }
        if !board.port_path.is_empty() {
            println!("  path: {}", board.port_path_display());
        }
    }

    Ok(())
}
