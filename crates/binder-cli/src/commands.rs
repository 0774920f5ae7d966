use crate::cli::{CategoryCommand, Commands, ContentCommand, KindArg, ModeArg, Switch, TriggerCommand};
use binder_core::config::ensure_config_dir;
use binder_core::content::DEFAULT_AREAS;
use binder_core::{
    set_clipboard_text, share, BinderError, ContentItem, ContentLibrary, InjectionMode, Profile,
    ProfileStore, Result, Settings, Trigger, TriggerKind,
};
use binder_daemon::{daemon_status, run_daemon, stop_daemon, DaemonStatus};
use tracing::warn;

impl From<KindArg> for TriggerKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Combo => TriggerKind::Combo,
            KindArg::Text => TriggerKind::TextPattern,
        }
    }
}

impl From<ModeArg> for InjectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Paste => InjectionMode::Paste,
            ModeArg::Type => InjectionMode::Type,
        }
    }
}

pub fn handle_command(command: Commands, profile: Option<String>) -> Result<()> {
    match command {
        Commands::Trigger { action } => handle_trigger(action, &profile_name(profile)),
        Commands::Category { action } => handle_category(action, &profile_name(profile)),
        Commands::Content { action } => handle_content(action),
        Commands::Run => run_daemon(profile),
        Commands::Status => handle_status(),
        Commands::Stop => stop_daemon().map(|pid| println!("Stopped engine (PID {})", pid)),
        Commands::Engine { state } => handle_engine(state),
    }
}

fn profile_name(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| Settings::load().profile)
}

/// Trigger numbers are shown starting at 1, so `0` never names a trigger.
fn index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .ok_or_else(|| BinderError::NotFound(format!("trigger #{}", number)))
}

fn indices(numbers: &[usize]) -> Result<Vec<usize>> {
    numbers.iter().map(|&n| index(n)).collect()
}

fn open_profile(name: &str) -> Result<(ProfileStore, Profile)> {
    ensure_config_dir()?;
    let store = ProfileStore::open_default();
    let profile = store.load(name)?;
    Ok((store, profile))
}

fn handle_trigger(action: TriggerCommand, name: &str) -> Result<()> {
    let (store, mut profile) = open_profile(name)?;

    match action {
        TriggerCommand::List { category } => {
            print_triggers(&profile, category.as_deref());
            return Ok(());
        }
        TriggerCommand::Share { number, copy } => {
            let trigger = profile
                .triggers
                .get(index(number)?)
                .ok_or_else(|| BinderError::NotFound(format!("trigger #{}", number)))?;
            let code = share::encode_trigger(trigger)?;
            println!("{}", code);
            if copy {
                set_clipboard_text(&code)?;
                println!("Share code copied to clipboard");
            }
            return Ok(());
        }
        TriggerCommand::Add {
            kind,
            pattern,
            payload,
            mode,
            category,
            disabled,
        } => {
            let mut trigger = Trigger::new(kind.into(), pattern.trim(), payload).with_mode(mode.into());
            if let Some(category) = category {
                trigger = trigger.with_category(category.trim());
            }
            if disabled {
                trigger = trigger.disabled();
            }
            let position = profile.add_trigger(trigger);
            println!("Trigger #{} added", position + 1);
        }
        TriggerCommand::Edit {
            number,
            pattern,
            payload,
            kind,
            mode,
            category,
        } => {
            let mut trigger = profile
                .triggers
                .get(index(number)?)
                .cloned()
                .ok_or_else(|| BinderError::NotFound(format!("trigger #{}", number)))?;
            if let Some(pattern) = pattern {
                trigger.pattern = pattern.trim().to_string();
            }
            if let Some(payload) = payload {
                trigger.payload = payload;
            }
            if let Some(kind) = kind {
                trigger.variant = kind.into();
            }
            if let Some(mode) = mode {
                trigger.injection_mode = mode.into();
            }
            if let Some(category) = category {
                trigger.category = category.trim().to_string();
            }
            profile.update_trigger(index(number)?, trigger)?;
            println!("Trigger #{} updated", number);
        }
        TriggerCommand::Remove { numbers } => {
            let removed = profile.remove_triggers(&indices(&numbers)?)?;
            println!("Removed {} trigger(s)", removed.len());
        }
        TriggerCommand::Duplicate { number } => {
            let position = profile.duplicate_trigger(index(number)?)?;
            println!("Trigger #{} duplicated as #{}", number, position + 1);
        }
        TriggerCommand::Enable { numbers } => {
            profile.set_enabled_many(&indices(&numbers)?, true)?;
            println!("Enabled {} trigger(s)", numbers.len());
        }
        TriggerCommand::Disable { numbers } => {
            profile.set_enabled_many(&indices(&numbers)?, false)?;
            println!("Disabled {} trigger(s)", numbers.len());
        }
        TriggerCommand::Favorite { number } => {
            let favorite = profile.toggle_favorite(index(number)?)?;
            println!(
                "Trigger #{} {}",
                number,
                if favorite { "marked as favorite" } else { "unmarked" }
            );
        }
        TriggerCommand::Move { category, numbers } => {
            profile.move_to_category(&indices(&numbers)?, &category)?;
            println!("Moved {} trigger(s) to '{}'", numbers.len(), category.trim());
        }
        TriggerCommand::ImportCode { code } => {
            let position = profile.import_share_code(&code)?;
            println!("Imported trigger #{}", position + 1);
        }
    }

    store.save(&profile)
}

fn print_triggers(profile: &Profile, category: Option<&str>) {
    let order = profile.listing_order(category);
    if order.is_empty() {
        println!("No triggers in profile '{}'", profile.name);
        return;
    }

    println!("{:<4} {:<2} {:<5} {:<16} {:<6} {:<16} TEXT", "#", "", "KIND", "TRIGGER", "MODE", "CATEGORY");
    for i in order {
        let trigger = &profile.triggers[i];
        let kind = match trigger.variant {
            TriggerKind::Combo => "combo",
            TriggerKind::TextPattern => "text",
        };
        let mode = match trigger.injection_mode {
            InjectionMode::Paste => "paste",
            InjectionMode::Type => "type",
        };
        let marks = format!(
            "{}{}",
            if trigger.favorite { "*" } else { " " },
            if trigger.enabled { " " } else { "-" }
        );
        println!(
            "{:<4} {:<2} {:<5} {:<16} {:<6} {:<16} {}",
            i + 1,
            marks,
            kind,
            trigger.pattern,
            mode,
            trigger.category,
            preview(&trigger.payload, 60)
        );
    }
}

fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}...", cut)
    }
}

fn handle_category(action: CategoryCommand, name: &str) -> Result<()> {
    let (store, mut profile) = open_profile(name)?;

    match action {
        CategoryCommand::List => {
            for category in &profile.categories {
                let count = profile
                    .triggers
                    .iter()
                    .filter(|t| &t.category == category)
                    .count();
                println!("{} ({})", category, count);
            }
            return Ok(());
        }
        CategoryCommand::Add { name } => {
            if profile.add_category(&name) {
                println!("Category '{}' added", name.trim());
            } else {
                println!("Category '{}' already exists or is empty", name.trim());
                return Ok(());
            }
        }
        CategoryCommand::Rename { old, new } => {
            profile.rename_category(&old, &new)?;
            println!("Category '{}' renamed to '{}'", old, new.trim());
        }
        CategoryCommand::Delete { name } => {
            let moved = profile.delete_category(&name)?;
            println!("Category '{}' deleted, {} trigger(s) moved", name, moved);
        }
    }

    store.save(&profile)
}

fn find_item(library: &ContentLibrary, area: &str, category: &str, id: &str) -> Result<ContentItem> {
    library
        .items(area, category)
        .into_iter()
        .find(|item| item.id == id)
        .ok_or_else(|| BinderError::NotFound(id.to_string()))
}

fn handle_content(action: ContentCommand) -> Result<()> {
    ensure_config_dir()?;
    let mut library = ContentLibrary::open_default();

    match action {
        ContentCommand::Categories { area } => {
            let categories = library.categories(&area);
            if categories.is_empty() {
                let known: Vec<&str> = DEFAULT_AREAS.iter().map(|(name, _)| *name).collect();
                return Err(BinderError::UnknownArea(format!(
                    "{} (known: {})",
                    area,
                    known.join(", ")
                )));
            }
            for category in categories {
                println!("{}", category);
            }
        }
        ContentCommand::List { area, category } => {
            let items = library.items(&area, &category);
            if items.is_empty() {
                println!("No items in {} / {}", area, category);
            }
            for item in items {
                let hint = if item.hint.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", item.hint)
                };
                println!(
                    "{}  uses {:<4} last {:<8} {}{}",
                    item.id,
                    item.uses_total,
                    item.formatted_last_used(),
                    preview(&item.text, 60),
                    hint
                );
            }
        }
        ContentCommand::Add {
            area,
            category,
            text,
            hint,
        } => {
            let item = library.add(&area, &category, &text, &hint)?;
            println!("Added {}", item.id);
        }
        ContentCommand::Edit {
            area,
            category,
            id,
            text,
            hint,
        } => {
            library.update(&area, &category, &id, &text, &hint)?;
            println!("Updated {}", id);
        }
        ContentCommand::Delete { area, category, id } => {
            library.delete(&area, &category, &id)?;
            println!("Deleted {}", id);
        }
        ContentCommand::Pick {
            area,
            category,
            fresh,
            copy,
        } => match library.pick_random(&area, &category, fresh) {
            Some(item) => {
                println!("{}", item.text);
                if !item.hint.is_empty() {
                    println!("hint: {}", item.hint);
                }
                if copy {
                    set_clipboard_text(&item.text)?;
                    library.mark_used(&area, &category, &item.id, true);
                }
            }
            None => println!("No items in {} / {}", area, category),
        },
        ContentCommand::Use {
            area,
            category,
            id,
            copy,
        } => {
            if copy {
                let item = find_item(&library, &area, &category, &id)?;
                set_clipboard_text(&item.text)?;
            }
            library.mark_used(&area, &category, &id, copy);
            println!("Recorded use of {}", id);
        }
        ContentCommand::Import {
            area,
            category,
            file,
        } => {
            let added = library.import_json(&area, &category, &file)?;
            println!("Imported {} item(s)", added);
        }
        ContentCommand::Export {
            area,
            category,
            file,
        } => {
            library.export_json(&area, &category, &file)?;
            println!("Exported {} / {} to {}", area, category, file.display());
        }
        ContentCommand::Stats { area, category } => {
            let categories = match category {
                Some(category) => vec![category],
                None => library.categories(&area),
            };
            println!("{:<20} {:>6} {:>11} {:>6}", "CATEGORY", "ITEMS", "USED TODAY", "USES");
            for category in categories {
                let stats = library.stats(&area, &category);
                println!(
                    "{:<20} {:>6} {:>11} {:>6}",
                    category, stats.items, stats.used_today, stats.uses_total
                );
            }
        }
    }

    Ok(())
}

fn handle_status() -> Result<()> {
    let settings = Settings::load();
    match daemon_status()? {
        DaemonStatus::Running(pid) => println!("binder engine is running with PID {}", pid),
        DaemonStatus::Stale(pid) => {
            println!("PID file exists but process {} is not running", pid);
            println!("The engine may have crashed; run 'binder stop' then 'binder run'");
        }
        DaemonStatus::Stopped => println!("binder engine is not running"),
    }
    println!("Profile: {}", settings.profile);
    println!(
        "Firing: {}",
        if settings.engine_enabled { "on" } else { "off" }
    );
    Ok(())
}

fn handle_engine(state: Switch) -> Result<()> {
    ensure_config_dir()?;
    let mut settings = Settings::load();
    settings.engine_enabled = matches!(state, Switch::On);
    settings.save()?;

    if let DaemonStatus::Stopped = daemon_status().unwrap_or(DaemonStatus::Stopped) {
        warn!("Engine is not running; the setting applies on next start");
    }
    println!(
        "Firing {}",
        if settings.engine_enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
