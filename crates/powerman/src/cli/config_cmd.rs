//! `config` subcommand: show current configuration and file path.

use super::{Config, ConfigOutput, Context, Result, kv, kv_indent, kv_width, load_config, print_json};

pub(super) fn cmd_config(ctx: &Context) -> Result<()> {
    let custom_path = ctx.config_path.as_deref();
    let config = load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());

    let problems: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if ctx.json {
        print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        });
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &[
            "vendor_id:",
            "product_id:",
            "bpm:",
            "tatums_per_beat:",
            "init_variant:",
            "version_format:",
            "request_kind:",
            "tune:",
        ],
    );

    match &config_path {
        Some(p) => {
            if config_exists {
                kv("Config file:", format_args!("{} (loaded)", p.display()), w);
            } else {
                kv(
                    "Config file:",
                    format_args!("{} (not found, using defaults)", p.display()),
                    w,
                );
            }
        }
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    let tempo = config.tempo();
    println!("Settings:");
    kv_indent("vendor_id:", format_args!("0x{:04X}", config.vendor_id), w);
    kv_indent("product_id:", format_args!("0x{:04X}", config.product_id), w);
    kv_indent("bpm:", config.bpm, w);
    kv_indent(
        "tatums_per_beat:",
        format_args!(
            "{} (tatum {} us, tone {} ms)",
            config.tatums_per_beat,
            tempo.tatum_interval().as_micros(),
            tempo.tone_duration_ms()
        ),
        w,
    );
    kv_indent("init_variant:", config.init_variant, w);
    kv_indent("version_format:", config.version_format, w);
    kv_indent("request_kind:", config.request_kind, w);
    kv_indent("tune:", config.tune, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
