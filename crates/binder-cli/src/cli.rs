use clap::{Parser, Subcommand, ValueEnum};
use std::env;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = "binder - combo and text triggers that type or paste your snippets",
    long_about = "binder fires saved text when you press a key combination or type a \
                  short pattern, and keeps a library of reusable messages."
)]
pub struct Binder {
    /// Profile to work on instead of the one in settings
    #[arg(long, short, global = true)]
    pub profile: Option<String>,

    /// Log at debug level unless BINDER_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the triggers of a profile
    Trigger {
        #[command(subcommand)]
        action: TriggerCommand,
    },
    /// Manage the categories of a profile
    Category {
        #[command(subcommand)]
        action: CategoryCommand,
    },
    /// Manage the content library
    Content {
        #[command(subcommand)]
        action: ContentCommand,
    },
    /// Run the trigger engine in the foreground
    Run,
    /// Show whether the engine is running
    Status,
    /// Stop a running engine
    Stop,
    /// Turn firing on or off without unloading triggers
    Engine {
        #[arg(value_enum)]
        state: Switch,
    },
}

#[derive(Subcommand)]
pub enum TriggerCommand {
    /// List triggers, favorites first
    List {
        #[arg(long, short)]
        category: Option<String>,
    },
    /// Add a trigger
    Add {
        #[arg(long, short, value_enum, default_value = "combo")]
        kind: KindArg,

        #[arg(help = "Key combination (e.g. F10+1) or text pattern (e.g. ;sig)")]
        pattern: String,

        #[arg(help = "Text to insert when the trigger fires")]
        payload: String,

        #[arg(long, short, value_enum, default_value = "paste")]
        mode: ModeArg,

        #[arg(long, short)]
        category: Option<String>,

        #[arg(long, help = "Store the trigger switched off")]
        disabled: bool,
    },
    /// Change fields of a trigger
    Edit {
        #[arg(help = "Trigger number as shown by `trigger list`")]
        number: usize,

        #[arg(long)]
        pattern: Option<String>,

        #[arg(long)]
        payload: Option<String>,

        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long)]
        category: Option<String>,
    },
    /// Remove triggers
    Remove {
        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Copy a trigger, appending `_copy` to its pattern
    Duplicate { number: usize },
    /// Switch triggers on
    Enable {
        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Switch triggers off
    Disable {
        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Toggle the favorite mark
    Favorite { number: usize },
    /// Move triggers to a category
    Move {
        category: String,

        #[arg(required = true)]
        numbers: Vec<usize>,
    },
    /// Print a share code for a trigger
    Share {
        number: usize,

        #[arg(long, help = "Also copy the code to the clipboard")]
        copy: bool,
    },
    /// Add a trigger from a share code
    ImportCode { code: String },
}

#[derive(Subcommand)]
pub enum CategoryCommand {
    /// List categories with their trigger counts
    List,
    /// Add a category
    Add { name: String },
    /// Rename a category and move its triggers
    Rename { old: String, new: String },
    /// Delete a category; its triggers move to the default one
    Delete { name: String },
}

#[derive(Subcommand)]
pub enum ContentCommand {
    /// List the categories of an area
    Categories { area: String },
    /// List the items of a category
    List { area: String, category: String },
    /// Add an item
    Add {
        area: String,
        category: String,
        text: String,

        #[arg(long, default_value = "")]
        hint: String,
    },
    /// Replace text and hint of an item
    Edit {
        area: String,
        category: String,
        id: String,
        text: String,

        #[arg(long, default_value = "")]
        hint: String,
    },
    /// Delete an item
    Delete {
        area: String,
        category: String,
        id: String,
    },
    /// Pick a random item
    Pick {
        area: String,
        category: String,

        #[arg(long, help = "Prefer items not used today")]
        fresh: bool,

        #[arg(long, help = "Copy the item to the clipboard and count a use")]
        copy: bool,
    },
    /// Count one use of an item
    Use {
        area: String,
        category: String,
        id: String,

        #[arg(long, help = "Copy the item to the clipboard as well")]
        copy: bool,
    },
    /// Import items from a JSON file
    Import {
        area: String,
        category: String,
        file: PathBuf,
    },
    /// Export items to a JSON file
    Export {
        area: String,
        category: String,
        file: PathBuf,
    },
    /// Show usage numbers per category
    Stats {
        area: String,
        category: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Combo,
    Text,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Paste,
    Type,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Switch {
    On,
    Off,
}
