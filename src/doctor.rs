//! Diagnostic tool for autoexec.
//!
//! This module implements the `autoexec doctor` command, which checks the system
//! for common issues:
//! - Readability of the settings file.
//! - Existence and writability of every profile's folders.
//! - Scripts folders that point at the AutoExec folder.
//! - Files in either folder that are not `.luau` scripts.
//!
//! It reports issues to the user with a pass/fail/warn status.

use anstyle::AnsiColor;
use std::path::Path;

use crate::fs_utils::read_file_names;
use crate::paths::Paths;
use crate::profiles::{ProfileKind, library_override, select_profile, stored_profile};
use crate::scripts::is_script;
use crate::settings::JsonSettings;
use crate::ui::Ui;

/// Run the doctor diagnostics
pub fn run_doctor(paths: &Paths, ui: &Ui) {
    ui.section("autoexec Doctor");
    ui.newline();

    // 1. Settings
    let mut settings = None;
    check_step(ui, "Settings File", || {
        match JsonSettings::load(&paths.settings_file) {
            Ok(loaded) => {
                if paths.settings_file.exists() {
                    ui.println(format!(
                        "  {} Settings readable: {}",
                        ui.icon_ok(),
                        paths.settings_file.display()
                    ));
                } else {
                    ui.println(format!(
                        "  {} Settings missing (fresh install?)",
                        ui.icon_warn()
                    ));
                }
                ui.println(format!(
                    "  {} Selected profile: {}",
                    ui.icon_info(),
                    stored_profile(&loaded)
                ));
                settings = Some(loaded);
                true
            }
            Err(e) => {
                ui.println(format!("  {} Settings corrupt: {:#}", ui.icon_err(), e));
                false
            }
        }
    });

    // 2. Each profile
    for kind in ProfileKind::all() {
        check_step(ui, &format!("{} Profile", kind), || {
            let custom = settings.as_ref().and_then(|s| library_override(s, kind));
            if let Some(dir) = &custom {
                ui.println(format!(
                    "  {} Custom scripts folder: {}",
                    ui.icon_info(),
                    dir.display()
                ));
            }

            let config = match select_profile(kind, paths, custom) {
                Ok(config) => config,
                Err(e) => {
                    ui.println(format!("  {} {}", ui.icon_err(), e));
                    return false;
                }
            };

            let mut ok = check_dir(ui, "Scripts folder", config.library_dir());
            ok &= check_dir(ui, "AutoExec folder", config.active_dir());
            report_strays(ui, config.library_dir());
            report_strays(ui, config.active_dir());
            ok
        });
    }
}

/// Report whether `dir` exists and can be written to
fn check_dir(ui: &Ui, label: &str, dir: &Path) -> bool {
    match std::fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => {
            ui.println(format!(
                "  {} {} is not a directory: {}",
                ui.icon_err(),
                label,
                dir.display()
            ));
            false
        }
        Ok(meta) if meta.permissions().readonly() => {
            ui.println(format!(
                "  {} {} is read-only: {}",
                ui.icon_err(),
                label,
                dir.display()
            ));
            false
        }
        Ok(_) => {
            ui.println(format!("  {} {}: {}", ui.icon_ok(), label, dir.display()));
            true
        }
        Err(_) => {
            // Created on demand; the executor may not be installed
            ui.println(format!(
                "  {} {} missing: {}",
                ui.icon_warn(),
                label,
                dir.display()
            ));
            true
        }
    }
}

fn report_strays(ui: &Ui, dir: &Path) {
    let Ok(names) = read_file_names(dir) else {
        return;
    };
    let strays = names.iter().filter(|n| !is_script(n)).count();
    if strays > 0 {
        ui.println(format!(
            "  {} {} non-script file(s) ignored in {}",
            ui.icon_info(),
            strays,
            dir.display()
        ));
    }
}

fn check_step<F>(ui: &Ui, name: &str, check_fn: F)
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    if !check_fn() {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
}
