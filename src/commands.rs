//! High-level command orchestration for the CLI.
//!
//! This module contains the handler functions for each CLI command (`list`, `on`, `use`, etc.).
//! It serves as the coordination layer, interacting with:
//! - `crate::ui` for user interaction (output, prompts).
//! - `crate::paths` for filesystem locations.
//! - `crate::manager` for profile selection, toggles and rescans.
//! - `crate::settings` for persisted preferences.
//!
//! Each function here generally corresponds to a subcommand in `main.rs`.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use inquire::MultiSelect;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::doctor::run_doctor;
use crate::manager::{ManagerOptions, ProfileManager};
use crate::paths::Paths;
use crate::profiles::ProfileKind;
use crate::scripts::{Classification, ScriptEntry};
use crate::settings::JsonSettings;
use crate::ui::Ui;

/// How often `watch` checks whether its time is up
const WATCH_POLL: Duration = Duration::from_millis(250);

fn open_manager(paths: &Paths, watch: bool) -> Result<ProfileManager> {
    let settings = JsonSettings::load(&paths.settings_file)?;
    let options = ManagerOptions {
        watch,
        ..ManagerOptions::default()
    };
    ProfileManager::start(paths.clone(), settings, options).context("Failed to load profile")
}

/// Print and forget everything the manager logged since the last call
fn flush_activity(manager: &mut ProfileManager, ui: &Ui) {
    for line in manager.activity_mut().drain() {
        ui.activity(&line);
    }
}

fn print_scripts(manager: &ProfileManager, ui: &Ui) {
    let profile = manager.current_profile();
    let title = format!("{} scripts", profile);
    ui.section(ui.colored(title, ui.profile_color(profile)));

    if manager.entries().is_empty() {
        ui.warn("No scripts found.");
        ui.println(format!(
            "  Put .luau files in {} or choose another folder with:",
            manager.config().library_dir().display()
        ));
        ui.println(format!("  {} set-folder <dir>", ui.bold("autoexec")));
        return;
    }

    ui.println(ui.script_table(profile, manager.entries()).to_string());
}

#[derive(Serialize)]
struct ScriptRow<'a> {
    #[serde(flatten)]
    entry: &'a ScriptEntry,
    state: Classification,
    active: bool,
}

/// List scripts of the current profile
pub fn list(paths: &Paths, json: bool, ui: &Ui) -> Result<()> {
    let mut manager = open_manager(paths, false)?;

    if json {
        let rows: Vec<ScriptRow> = manager
            .entries()
            .iter()
            .map(|entry| ScriptRow {
                entry,
                state: entry.classification(),
                active: entry.classification().is_active(),
            })
            .collect();
        ui.println(serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    flush_activity(&mut manager, ui);
    print_scripts(&manager, ui);
    Ok(())
}

/// Show the current profile and its directories
pub fn current(paths: &Paths, ui: &Ui) -> Result<()> {
    let mut manager = open_manager(paths, false)?;
    flush_activity(&mut manager, ui);
    let config = manager.config();

    ui.section("Current Profile");
    ui.newline();

    let dir_cell = |dir: &Path| {
        if dir.is_dir() {
            ui.cell(dir.display().to_string())
        } else {
            ui.colored_cell(format!("{} (missing)", dir.display()), AnsiColor::Yellow)
        }
    };

    let active = manager
        .entries()
        .iter()
        .filter(|e| e.classification().is_active())
        .count();

    let mut table = ui.simple_table();
    table.add_row(vec![
        ui.cell("Selected profile:"),
        ui.colored_cell(config.name(), ui.profile_color(config.kind())),
    ]);
    table.add_row(vec![ui.cell("Scripts folder:"), dir_cell(config.library_dir())]);
    table.add_row(vec![ui.cell("AutoExec folder:"), dir_cell(config.active_dir())]);
    table.add_row(vec![
        ui.cell("Keep orphans:"),
        ui.cell(if config.preserve_orphans() { "yes" } else { "no" }),
    ]);
    table.add_row(vec![
        ui.cell("Scripts:"),
        ui.cell(format!("{} active / {} total", active, manager.entries().len())),
    ]);

    ui.println(table.to_string());
    Ok(())
}

fn switch_with_spinner<F>(paths: &Paths, ui: &Ui, label: &str, switch: F) -> Result<()>
where
    F: FnOnce(&mut ProfileManager) -> crate::error::Result<()>,
{
    paths.ensure_dirs()?;
    let mut manager = open_manager(paths, false)?;
    flush_activity(&mut manager, ui);

    let spinner = ui.spinner(format!("Switching to {}...", label));
    match switch(&mut manager) {
        Ok(()) => {
            ui.spinner_finish_ok(
                &spinner,
                format!("Active profile: {}", manager.current_profile()),
            );
            manager.activity_mut().drain();
            print_scripts(&manager, ui);
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Failed to switch: {}", e));
            Err(e.into())
        }
    }
}

/// Switch to a named profile
pub fn use_profile(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let kind: ProfileKind = name.parse().map_err(anyhow::Error::msg)?;
    switch_with_spinner(paths, ui, &format!("profile '{}'", kind), |manager| {
        manager.switch_profile(kind).map(|_| ())
    })
}

/// Switch to the next profile in order
pub fn next(paths: &Paths, ui: &Ui) -> Result<()> {
    switch_with_spinner(paths, ui, "next profile", |manager| {
        manager.cycle_profile().map(|_| ())
    })
}

/// Choose the scripts folder of the current profile
pub fn set_folder(paths: &Paths, dir: &Path, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;
    let dir = std::path::absolute(dir)
        .with_context(|| format!("Failed to resolve path: {}", dir.display()))?;
    if !dir.is_dir() {
        ui.warn(format!(
            "{} does not exist yet; it will be created on first deactivation",
            dir.display()
        ));
    }

    let mut manager = open_manager(paths, false)?;
    manager.set_library_dir(&dir)?;
    flush_activity(&mut manager, ui);
    print_scripts(&manager, ui);
    Ok(())
}

/// Activate or deactivate each named script
pub fn set_scripts(paths: &Paths, scripts: &[String], active: bool, ui: &Ui) -> Result<()> {
    if scripts.is_empty() {
        bail!("No scripts given");
    }

    let mut manager = open_manager(paths, false)?;
    flush_activity(&mut manager, ui);

    let mut failed = 0;
    for script in scripts {
        let name = with_extension(script);
        if manager.set_active(&name, active).is_err() {
            failed += 1;
        }
    }

    flush_activity(&mut manager, ui);
    ui.newline();
    print_scripts(&manager, ui);

    if failed > 0 {
        bail!("{} of {} scripts could not be changed", failed, scripts.len());
    }
    Ok(())
}

/// Pick active scripts interactively
pub fn toggle(paths: &Paths, ui: &Ui) -> Result<()> {
    let mut manager = open_manager(paths, false)?;
    flush_activity(&mut manager, ui);

    if manager.entries().is_empty() {
        print_scripts(&manager, ui);
        return Ok(());
    }

    let names: Vec<String> = manager
        .entries()
        .iter()
        .map(|e| e.filename().to_string())
        .collect();
    let defaults: Vec<usize> = manager
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| e.classification().is_active())
        .map(|(i, _)| i)
        .collect();

    let prompt = format!("{} scripts to run on attach:", manager.current_profile());
    let selected = MultiSelect::new(&prompt, names.clone())
        .with_default(&defaults)
        .with_help_message("Space to toggle, Enter to apply")
        .prompt()
        .context("Selection cancelled")?;

    let mut failed = 0;
    for (index, name) in names.iter().enumerate() {
        let want = selected.contains(name);
        if want == defaults.contains(&index) {
            continue;
        }
        if manager.set_active(name, want).is_err() {
            failed += 1;
        }
    }

    flush_activity(&mut manager, ui);
    ui.newline();
    print_scripts(&manager, ui);

    if failed > 0 {
        bail!("{} scripts could not be changed", failed);
    }
    Ok(())
}

/// Keep the script table up to date as the folders change
pub fn watch(paths: &Paths, duration: Option<Duration>, ui: &Ui) -> Result<()> {
    let mut manager = open_manager(paths, true)?;
    flush_activity(&mut manager, ui);

    for dir in manager.unwatched_dirs() {
        ui.warn(format!(
            "{} does not exist; it will be watched once created",
            dir.display()
        ));
    }
    print_scripts(&manager, ui);
    ui.info("Watching for changes...");

    let deadline = duration.map(|d| Instant::now() + d);
    while deadline.is_none_or(|at| Instant::now() < at) {
        match manager.wait_for_trigger(WATCH_POLL) {
            Ok(Some(_)) => {
                flush_activity(&mut manager, ui);
                ui.newline();
                print_scripts(&manager, ui);
            }
            Ok(None) => {}
            Err(e) => {
                flush_activity(&mut manager, ui);
                ui.warn(format!("Rescan failed: {}", e));
            }
        }
    }

    manager.shutdown();
    Ok(())
}

/// Run diagnostics
pub fn doctor(paths: &Paths, ui: &Ui) -> Result<()> {
    run_doctor(paths, ui);
    Ok(())
}

/// Accept script names with or without the `.luau` extension
fn with_extension(name: &str) -> String {
    let suffix = format!(".{}", crate::scripts::SCRIPT_EXTENSION);
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{setup_test_paths, touch};
    use crate::ui::ColorMode;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn test_ui() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        // Should not error, just show "no scripts"
        assert!(list(&paths, false, &ui).is_ok());
        assert!(list(&paths, true, &ui).is_ok());
    }

    #[test]
    fn test_script_row_json() {
        let entries = crate::scripts::derive(["a.luau"], ["a.luau", "b.luau"]);
        let rows: Vec<ScriptRow> = entries
            .iter()
            .map(|entry| ScriptRow {
                entry,
                state: entry.classification(),
                active: entry.classification().is_active(),
            })
            .collect();
        let value = serde_json::to_value(&rows).unwrap();

        assert_eq!(value[0]["filename"], "a.luau");
        assert_eq!(value[0]["state"], "both");
        assert_eq!(value[1]["state"], "active_only");
        assert_eq!(value[1]["in_library"], false);
        assert_eq!(value[1]["active"], true);
    }

    #[test]
    fn test_on_and_off() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let library = ProfileKind::Wave.default_library_dir(&paths);
        let active = ProfileKind::Wave.active_dir(&paths);
        fs::create_dir_all(&library).unwrap();
        touch(&library, "esp.luau");

        set_scripts(&paths, &["esp".to_string()], true, &ui).unwrap();
        assert!(active.join("esp.luau").is_file());

        set_scripts(&paths, &["esp.luau".to_string()], false, &ui).unwrap();
        assert!(!active.join("esp.luau").exists());
        assert!(library.join("esp.luau").is_file());
    }

    #[test]
    fn test_on_missing_script_fails() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        assert!(set_scripts(&paths, &["missing".to_string()], true, &ui).is_err());
        assert!(set_scripts(&paths, &[], true, &ui).is_err());
    }

    #[test]
    fn test_use_persists_profile() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        use_profile(&paths, "zenith", &ui).unwrap();
        let settings = JsonSettings::load(&paths.settings_file).unwrap();
        assert_eq!(settings.values().get("current_mode").unwrap(), "Zenith");

        next(&paths, &ui).unwrap();
        let settings = JsonSettings::load(&paths.settings_file).unwrap();
        assert_eq!(settings.values().get("current_mode").unwrap(), "AWP");
    }

    #[test]
    fn test_use_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        assert!(use_profile(&paths, "nonexistent", &ui).is_err());
    }

    #[test]
    fn test_set_folder_rejects_active_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        let active = ProfileKind::Wave.active_dir(&paths);

        assert!(set_folder(&paths, &active, &ui).is_err());

        let custom = temp_dir.path().join("mine");
        fs::create_dir_all(&custom).unwrap();
        set_folder(&paths, &custom, &ui).unwrap();
        let settings = JsonSettings::load(&paths.settings_file).unwrap();
        assert_eq!(
            settings.values().get("wave_script_folder").map(String::as_str),
            Some(custom.to_str().unwrap())
        );
    }

    #[test]
    fn test_current_no_settings() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();
        // Should not error
        assert!(current(&paths, &ui).is_ok());
    }

    #[test]
    #[serial]
    fn test_watch_with_duration_returns() {
        let temp_dir = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp_dir);
        let ui = test_ui();

        watch(&paths, Some(Duration::from_millis(300)), &ui).unwrap();
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("esp"), "esp.luau");
        assert_eq!(with_extension("esp.luau"), "esp.luau");
    }
}
