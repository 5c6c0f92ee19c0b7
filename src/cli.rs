// cli.rs - CLI argument parsing and dispatch

use crate::drift::{self, DriftItem, FixOptions};
use crate::installer::Installer;
use crate::ops::init::{InitOptions, OutsideHookPolicy};
use crate::ops::{hub_cmd, init, migrate, profile, reset};
use crate::paths::{CcpPaths, HubItemType};
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;

#[derive(Parser, Debug)]
#[command(
    name = "ccp",
    version,
    about = "Switchable configuration profiles for Claude Code"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutsideHooksArg {
    Copy,
    Keep,
    Skip,
}

impl From<OutsideHooksArg> for OutsideHookPolicy {
    fn from(arg: OutsideHooksArg) -> Self {
        match arg {
            OutsideHooksArg::Copy => OutsideHookPolicy::Copy,
            OutsideHooksArg::Keep => OutsideHookPolicy::Keep,
            OutsideHooksArg::Skip => OutsideHookPolicy::Skip,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Migrate the live config dir into hub + default profile + symlink.
    Init {
        /// Show the migration plan without making changes.
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// What to do with hook scripts outside the live dir.
        #[arg(long = "outside-hooks", value_enum, default_value = "copy")]
        outside_hooks: OutsideHooksArg,

        /// Do not extract settings keys as reusable fragments.
        #[arg(long = "no-fragments")]
        no_fragments: bool,
    },
    /// Switch the live symlink to another profile.
    Use { profile: String },
    /// Print the active profile name.
    Current,
    /// List profiles.
    List,
    /// Report drift between a profile's manifest and its links (exit 1 on drift).
    Check { profile: Option<String> },
    /// Reconcile drift.
    Fix {
        profile: Option<String>,

        /// Drop manifest entries whose hub items are gone without asking.
        #[arg(long)]
        force: bool,

        /// Show planned changes without touching files.
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Fix drift and recompose settings for one or all profiles.
    Sync { profile: Option<String> },
    /// Materialize the active profile back into a plain directory and
    /// remove the root.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Profile management.
    #[command(subcommand)]
    Profile(ProfileCmd),
    /// Link a hub item into a profile.
    Link {
        /// Hub item type (skills, agents, hooks, rules, commands,
        /// setting-fragments).
        item_type: String,
        name: String,

        /// Target profile (defaults to the active one).
        #[arg(long)]
        profile: Option<String>,
    },
    /// Remove a hub item from a profile.
    Unlink {
        item_type: String,
        name: String,

        #[arg(long)]
        profile: Option<String>,
    },
    /// Hub item management.
    #[command(subcommand)]
    Hub(HubCmd),
    /// External source management.
    #[command(subcommand)]
    Source(SourceCmd),
    /// Run pending format migrations.
    Migrate {
        /// Report what would migrate without changing anything.
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
    /// Run a command (default: $SHELL) against a profile's config dir.
    Run {
        /// Profile to expose (defaults to the active one).
        #[arg(long)]
        profile: Option<String>,

        /// Command and arguments.
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCmd {
    /// Create an empty profile.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Clone an existing profile under a new name.
    Clone { src: String, dst: String },
    /// Delete a profile (never the active or the only one).
    Delete { name: String },
    /// List profiles.
    List,
}

#[derive(Subcommand, Debug)]
pub enum HubCmd {
    /// Copy a path into the hub, or promote a profile-local directory.
    Add {
        item_type: String,
        path: std::path::PathBuf,

        /// Item name (defaults to the file name).
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing item.
        #[arg(long)]
        replace: bool,
    },
    /// Remove a hub item.
    Remove {
        item_type: String,
        name: String,

        /// Remove even while profiles reference it.
        #[arg(long)]
        force: bool,
    },
    /// Rename a hub item and update every referencing profile.
    Rename {
        item_type: String,
        old: String,
        new: String,
    },
    /// List hub items with provenance and usage.
    List { item_type: Option<String> },
    /// Remove hub items no profile references.
    Prune {
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Add an item to the protection list (prune will not touch it).
    Protect {
        /// "type/name" key, e.g. skills/foo.
        key: String,
    },
    /// Remove an item from the protection list.
    Unprotect { key: String },
    /// Show orphaned, missing, and shared items across profiles.
    Usage,
    /// Open a hub item in $EDITOR.
    Edit { item_type: String, name: String },
}

#[derive(Subcommand, Debug)]
pub enum SourceCmd {
    /// Fetch a source (registry id or git URL) and install items from it.
    Install {
        /// "owner/repo" or a git URL.
        spec: String,

        #[arg(long = "ref")]
        reference: Option<String>,

        /// Specific "type/name" items (default: everything discoverable).
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        items: Vec<String>,
    },
    /// Remove installed items and trim the registry.
    Uninstall {
        /// "type/name" items.
        items: Vec<String>,
    },
    /// Re-fetch a source and refresh its installed items.
    Update { id: String },
    /// List installed sources.
    List,
}

fn parse_item_type(raw: &str) -> Result<HubItemType> {
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

/// Interactive yes/no used before destructive operations.
fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

/// Execute a parsed command. Returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let paths = CcpPaths::from_env();

    match cli.command {
        Command::Init {
            dry_run,
            outside_hooks,
            no_fragments,
        } => {
            let opts = InitOptions {
                dry_run,
                outside_hooks: outside_hooks.into(),
                extract_fragments: !no_fragments,
            };
            let plan = init::plan(&paths, &opts)?;
            if dry_run {
                init::print_plan(&plan);
            } else {
                init::execute(&paths, &plan, &opts)?;
            }
            Ok(0)
        }

        Command::Use { profile } => {
            profile::use_profile(&paths, &profile)?;
            Ok(0)
        }

        Command::Current => {
            match profile::active(&paths)? {
                Some(name) => println!("{name}"),
                None => println!("(none)"),
            }
            Ok(0)
        }

        Command::List | Command::Profile(ProfileCmd::List) => {
            let active = profile::active(&paths)?;
            for name in profile::list(&paths)? {
                let marker = if active.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name}");
            }
            Ok(0)
        }

        Command::Check { profile: target } => {
            let target = profile::resolve_target(&paths, target.as_deref())?;
            let report = drift::detect(&paths, &target)?;
            if !report.has_drift() {
                println!("No drift in '{target}'");
                return Ok(0);
            }
            println!("Drift in '{target}':");
            for item in &report.items {
                println!("  {}", item.describe());
            }
            Ok(1)
        }

        Command::Fix {
            profile: target,
            force,
            dry_run,
        } => {
            let target = profile::resolve_target(&paths, target.as_deref())?;
            let report = drift::detect(&paths, &target)?;
            if !report.has_drift() {
                println!("No drift in '{target}'");
                return Ok(0);
            }
            let ask = |item: &DriftItem| {
                confirm(&format!(
                    "Hub item {}/{} is gone; drop it from the manifest?",
                    item.item_type, item.name
                ))
            };
            let opts = FixOptions {
                force,
                dry_run,
                confirm_hub_missing: if force { None } else { Some(&ask) },
            };
            let outcome = drift::fix(&paths, &target, &report, &opts)?;
            for action in &outcome.actions {
                println!("  {action}");
            }
            if outcome.unresolved > 0 {
                eprintln!("{} item(s) left unresolved", outcome.unresolved);
            }
            Ok(0)
        }

        Command::Sync { profile: target } => {
            profile::sync(&paths, target.as_deref())?;
            Ok(0)
        }

        Command::Reset { yes } => {
            if !yes
                && !confirm(&format!(
                    "Dismantle ccp and materialize the active profile into {}?",
                    paths.live_dir().display()
                ))
            {
                println!("Aborted");
                return Ok(1);
            }
            reset::reset(&paths)?;
            Ok(0)
        }

        Command::Profile(cmd) => {
            match cmd {
                ProfileCmd::Create { name, description } => {
                    profile::create(&paths, &name, description)?
                }
                ProfileCmd::Clone { src, dst } => profile::clone(&paths, &src, &dst)?,
                ProfileCmd::Delete { name } => profile::delete(&paths, &name)?,
                ProfileCmd::List => unreachable!("handled above"),
            }
            Ok(0)
        }

        Command::Link {
            item_type,
            name,
            profile: target,
        } => {
            let item_type = parse_item_type(&item_type)?;
            let target = profile::resolve_target(&paths, target.as_deref())?;
            profile::link(&paths, &target, item_type, &name)?;
            Ok(0)
        }

        Command::Unlink {
            item_type,
            name,
            profile: target,
        } => {
            let item_type = parse_item_type(&item_type)?;
            let target = profile::resolve_target(&paths, target.as_deref())?;
            profile::unlink(&paths, &target, item_type, &name)?;
            Ok(0)
        }

        Command::Hub(cmd) => {
            match cmd {
                HubCmd::Add {
                    item_type,
                    path,
                    name,
                    replace,
                } => {
                    let item_type = parse_item_type(&item_type)?;
                    hub_cmd::add(&paths, item_type, &path, name.as_deref(), replace)?;
                }
                HubCmd::Remove {
                    item_type,
                    name,
                    force,
                } => {
                    let item_type = parse_item_type(&item_type)?;
                    hub_cmd::remove(&paths, item_type, &name, force)?;
                }
                HubCmd::Rename {
                    item_type,
                    old,
                    new,
                } => {
                    let item_type = parse_item_type(&item_type)?;
                    hub_cmd::rename(&paths, item_type, &old, &new)?;
                }
                HubCmd::List { item_type } => {
                    let item_type = item_type.as_deref().map(parse_item_type).transpose()?;
                    hub_cmd::list(&paths, item_type)?;
                }
                HubCmd::Prune { dry_run, yes } => {
                    if dry_run || yes {
                        hub_cmd::prune(&paths, dry_run)?;
                    } else {
                        let orphans = hub_cmd::prune(&paths, true)?;
                        if !orphans.is_empty()
                            && confirm(&format!("Remove {} orphaned item(s)?", orphans.len()))
                        {
                            hub_cmd::prune(&paths, false)?;
                        }
                    }
                }
                HubCmd::Protect { key } => hub_cmd::protect(&paths, &key)?,
                HubCmd::Unprotect { key } => hub_cmd::unprotect(&paths, &key)?,
                HubCmd::Usage => {
                    let report = hub_cmd::usage(&paths)?;
                    print_usage_section("Orphaned (no profile references)", &report.orphans);
                    print_usage_section("Missing (referenced, not in hub)", &report.missing);
                    print_usage_section("Shared (multiple profiles)", &report.shared);
                }
                HubCmd::Edit { item_type, name } => {
                    let item_type = parse_item_type(&item_type)?;
                    let path = crate::hub::item_path(&paths, item_type, &name);
                    if !path.exists() {
                        return Err(crate::error::CcpError::not_found(format!(
                            "hub item {item_type}/{name}"
                        ))
                        .into());
                    }
                    profile::open_in_editor(&path)?;
                }
            }
            Ok(0)
        }

        Command::Source(cmd) => {
            let installer = Installer::new(&paths);
            match cmd {
                SourceCmd::Install {
                    spec,
                    reference,
                    items,
                } => {
                    let installed = installer.install(&spec, reference.as_deref(), &items)?;
                    println!("Installed {} item(s)", installed.len());
                }
                SourceCmd::Uninstall { items } => installer.uninstall(&items)?,
                SourceCmd::Update { id } => {
                    let outcome = installer.update(&id)?;
                    if outcome.updated {
                        println!(
                            "Updated {id}: {} -> {}",
                            outcome.old_commit.as_deref().unwrap_or("?"),
                            outcome.new_commit.as_deref().unwrap_or("?")
                        );
                    } else {
                        println!("{id} is already up to date");
                    }
                }
                SourceCmd::List => {
                    let config = crate::registry::RootConfig::load(&paths)?;
                    for (id, entry) in &config.sources {
                        println!(
                            "{:<32} {:<8} {} item(s)",
                            id,
                            entry.registry,
                            entry.installed.len()
                        );
                    }
                }
            }
            Ok(0)
        }

        Command::Migrate { dry_run } => {
            migrate::run_all(&paths, dry_run)?;
            Ok(0)
        }

        Command::Run {
            profile: target,
            command,
        } => {
            let target = profile::resolve_target(&paths, target.as_deref())?;
            profile::run(&paths, &target, &command)
        }
    }
}

fn print_usage_section(title: &str, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    println!("{title}:");
    for key in keys {
        println!("  {key}");
    }
}
