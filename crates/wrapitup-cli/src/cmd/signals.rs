//! `wrapitup signals` - show the host signal policy

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use wrapitup_core::{Signal, SignalPolicy, platform, signal::join_names};

pub fn run() {
    let policy = platform::host();
    eprintln!("{}", summary(policy));
    eprintln!("\n{}", catalog_table(policy));
}

fn summary(policy: &SignalPolicy) -> String {
    let mut out = format!(
        "Platform: {}\nDefault signals: {}",
        policy.family(),
        join_names(policy.defaults())
    );
    match policy.allowed() {
        Some(allowed) => {
            out.push_str(&format!("\nRestricted to: {}", join_names(allowed)));
        }
        None => out.push_str("\nRestricted: no"),
    }
    out
}

fn catalog_table(policy: &SignalPolicy) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Signal").fg(Color::Cyan),
            Cell::new("Number").fg(Color::Cyan),
            Cell::new("Default").fg(Color::Cyan),
            Cell::new("Usable").fg(Color::Cyan),
        ]);

    for signal in Signal::catalog() {
        let is_default = policy.defaults().contains(&signal);
        let usable = policy.check(&[signal]).is_ok();
        table.add_row(vec![
            Cell::new(signal.name()),
            Cell::new(signal.as_raw()),
            if is_default {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("")
            },
            if usable {
                Cell::new("yes")
            } else {
                Cell::new("no").fg(Color::Red)
            },
        ]);
    }
    table
}
