use anyhow::Result;
use std::io::Write;
use std::path::Path;
use wpedit_core::config::{EffectiveConfig, resolve_config};

use crate::output::{OutputMode, kv, render, section};

pub fn run_config(project_root: &Path, output: OutputMode) -> Result<()> {
    let effective = resolve_config(project_root, output.is_json())?;
    render(output, &effective, print_effective)
}

fn print_effective(value: &EffectiveConfig, w: &mut dyn Write) -> std::io::Result<()> {
    section(w, "Effective configuration")?;
    kv(w, "output", &value.resolved_output)?;
    if let Some(out) = &value.user.output {
        kv(w, "user.output", out)?;
    }
    writeln!(w)?;
    writeln!(w, "[timeline]")?;
    kv(
        w,
        "pixels_per_day",
        value.editor.timeline.pixels_per_day.to_string(),
    )?;
    writeln!(w)?;
    writeln!(w, "[hooks]")?;
    kv(
        w,
        "refresh_parent",
        value.editor.hooks.refresh_parent.to_string(),
    )?;
    kv(
        w,
        "invalidate_activity",
        value.editor.hooks.invalidate_activity.to_string(),
    )?;
    kv(
        w,
        "publish_events",
        value.editor.hooks.publish_events.to_string(),
    )?;
    writeln!(w)?;
    writeln!(w, "[save]")?;
    kv(
        w,
        "notify_success",
        value.editor.save.notify_success.to_string(),
    )
}
