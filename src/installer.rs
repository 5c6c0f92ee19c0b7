// installer.rs - External source boundary: providers, registries, installer

use crate::error::CcpError;
use crate::hub::{self, item_key};
use crate::paths::{CcpPaths, HubItemType};
use crate::registry::{RootConfig, SourceEntry};
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Git,
    Http,
}

impl ProviderType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderType::Git => "git",
            ProviderType::Http => "http",
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchOpts<'a> {
    pub reference: Option<&'a str>,
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub updated: bool,
    pub old_commit: Option<String>,
    pub new_commit: Option<String>,
}

/// Downloads a source into a local cache dir. Implementations stream their
/// own progress to the terminal.
pub trait Provider {
    fn fetch(&self, url: &str, dest: &Path, opts: &FetchOpts) -> Result<()>;
    fn update(&self, dest: &Path, opts: &FetchOpts) -> Result<UpdateOutcome>;
}

/// Git provider shelling out to the system `git`.
pub struct GitProvider;

impl GitProvider {
    fn git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .context("failed to launch git (is it installed?)")?;
        if !output.status.success() {
            anyhow::bail!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn head_commit(dest: &Path) -> Result<String> {
        Self::git(&["rev-parse", "HEAD"], Some(dest))
    }
}

impl Provider for GitProvider {
    fn fetch(&self, url: &str, dest: &Path, opts: &FetchOpts) -> Result<()> {
        crate::fsutil::remove_any(dest)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let dest_str = dest.to_string_lossy();
        let mut args = vec!["clone", "--depth", "1"];
        if let Some(reference) = opts.reference {
            args.extend(["--branch", reference]);
        }
        args.extend([url, dest_str.as_ref()]);
        Self::git(&args, None)?;
        debug!(url, dest = %dest.display(), "fetched source");
        Ok(())
    }

    fn update(&self, dest: &Path, opts: &FetchOpts) -> Result<UpdateOutcome> {
        let old_commit = Self::head_commit(dest).ok();
        let reference = opts.reference.unwrap_or("HEAD");
        Self::git(&["fetch", "--depth", "1", "origin", reference], Some(dest))?;
        Self::git(&["reset", "--hard", "FETCH_HEAD"], Some(dest))?;
        let new_commit = Self::head_commit(dest).ok();
        Ok(UpdateOutcome {
            updated: old_commit != new_commit,
            old_commit,
            new_commit,
        })
    }
}

/// Archive downloads are registry plumbing this crate does not carry; the
/// provider exists so the registry can name it, and it fails loudly.
pub struct HttpProvider;

impl Provider for HttpProvider {
    fn fetch(&self, url: &str, _dest: &Path, _opts: &FetchOpts) -> Result<()> {
        anyhow::bail!("http provider cannot fetch {url}: only git sources are supported")
    }

    fn update(&self, dest: &Path, _opts: &FetchOpts) -> Result<UpdateOutcome> {
        anyhow::bail!(
            "http provider cannot update {}: only git sources are supported",
            dest.display()
        )
    }
}

pub fn provider(provider_type: ProviderType) -> Box<dyn Provider> {
    match provider_type {
        ProviderType::Git => Box::new(GitProvider),
        ProviderType::Http => Box::new(HttpProvider),
    }
}

// --- Registries ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Package {
    pub id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PackageDetails {
    pub url: String,
    pub reference: Option<String>,
    pub provider_type: ProviderType,
    pub registry: String,
}

pub trait RegistryProvider {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Package>>;
    fn get(&self, id: &str) -> Result<PackageDetails>;
}

/// GitHub registry adapter: resolves "owner/repo" ids to clone URLs.
/// Search needs the network stack this crate does not carry.
pub struct GithubRegistry;

impl RegistryProvider for GithubRegistry {
    fn search(&self, query: &str, _limit: usize) -> Result<Vec<Package>> {
        anyhow::bail!("github search for '{query}' requires network access; install by id instead")
    }

    fn get(&self, id: &str) -> Result<PackageDetails> {
        if id.split('/').count() != 2 {
            return Err(CcpError::InvalidName {
                name: id.to_string(),
                reason: "github package ids look like owner/repo".to_string(),
            }
            .into());
        }
        Ok(PackageDetails {
            url: format!("https://github.com/{id}.git"),
            reference: None,
            provider_type: ProviderType::Git,
            registry: "github".to_string(),
        })
    }
}

pub fn registry(name: &str) -> Result<Box<dyn RegistryProvider>> {
    match name {
        "github" | "skills.sh" => Ok(Box::new(GithubRegistry)),
        other => Err(CcpError::not_found(format!("registry '{other}'")).into()),
    }
}

// --- Installer -------------------------------------------------------------

pub struct Installer<'a> {
    paths: &'a CcpPaths,
}

impl<'a> Installer<'a> {
    pub fn new(paths: &'a CcpPaths) -> Self {
        Installer { paths }
    }

    /// "type/name" pairs discoverable inside a fetched source: typed
    /// subdirectories first, plus a top-level SKILL.md making the repo
    /// itself a skill.
    pub fn discover(&self, source_dir: &Path) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for item_type in HubItemType::ALL {
            let dir = source_dir.join(item_type.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let mut entries: Vec<_> = fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let entry_str = entry.file_name().to_string_lossy().to_string();
                if entry_str.starts_with('.') {
                    continue;
                }
                if let Some(name) = hub::name_from_entry(item_type, &entry_str) {
                    found.push(item_key(item_type, &name));
                }
            }
        }
        if source_dir.join("SKILL.md").is_file() {
            if let Some(name) = source_dir.file_name() {
                found.push(item_key(
                    HubItemType::Skills,
                    &name.to_string_lossy(),
                ));
            }
        }
        Ok(found)
    }

    /// Fetch a source (by registry id or git URL) into the cache and
    /// install the selected items, or everything discoverable.
    pub fn install(
        &self,
        spec: &str,
        reference: Option<&str>,
        items: &[String],
    ) -> Result<Vec<String>> {
        let (id, details) = resolve_spec(spec)?;
        let source_dir = self.paths.source_dir(&id);

        let fetch_opts = FetchOpts {
            reference: reference.or(details.reference.as_deref()),
        };
        provider(details.provider_type).fetch(&details.url, &source_dir, &fetch_opts)?;
        let commit = GitProvider::head_commit(&source_dir).ok();

        let discovered = self.discover(&source_dir)?;
        let selected: Vec<String> = if items.is_empty() {
            discovered
        } else {
            for item in items {
                if !discovered.iter().any(|d| d == item) {
                    return Err(CcpError::not_found(format!("{item} in {id}")).into());
                }
            }
            items.to_vec()
        };
        if selected.is_empty() {
            anyhow::bail!("nothing discoverable to install in {id}");
        }

        let mut config = RootConfig::load(self.paths)?;
        // Keep whatever this source already installed in earlier runs.
        let previously_installed = config
            .sources
            .get(&id)
            .map(|e| e.installed.clone())
            .unwrap_or_default();
        config.sources.insert(
            id.clone(),
            SourceEntry {
                registry: details.registry.clone(),
                provider: details.provider_type.as_str().to_string(),
                url: details.url.clone(),
                path: source_dir.clone(),
                reference: fetch_opts.reference.map(str::to_string),
                commit,
                installed: previously_installed,
                updated: Some(Utc::now()),
            },
        );

        let mut installed = Vec::new();
        for key in &selected {
            let (type_str, name) = key
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("malformed item key '{key}'"))?;
            let item_type: HubItemType =
                type_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;

            let src = source_item_path(&source_dir, item_type, name);
            let dest = hub::item_path(self.paths, item_type, name);
            if dest.exists() {
                eprintln!("Warning: {key} already in hub, overwriting");
                crate::fsutil::remove_any(&dest)?;
            }
            crate::fsutil::copy_entry(&src, &dest, true)?;
            config.record_installed(&id, key);
            installed.push(key.clone());
            println!("  Installed: {key}");
        }

        config.save(self.paths)?;
        Ok(installed)
    }

    /// Remove installed items from the hub and trim the registry.
    pub fn uninstall(&self, items: &[String]) -> Result<()> {
        let mut config = RootConfig::load(self.paths)?;
        for key in items {
            let (type_str, name) = key
                .split_once('/')
                .ok_or_else(|| anyhow::anyhow!("malformed item key '{key}'"))?;
            let item_type: HubItemType =
                type_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            crate::fsutil::remove_any(&hub::item_path(self.paths, item_type, name))?;
            config.forget_installed(key);
            println!("  Uninstalled: {key}");
        }
        config.save(self.paths)
    }

    /// Re-fetch a source and refresh its installed items.
    pub fn update(&self, id: &str) -> Result<UpdateOutcome> {
        let mut config = RootConfig::load(self.paths)?;
        let entry = config
            .sources
            .get(id)
            .ok_or_else(|| CcpError::not_found(format!("source '{id}'")))?
            .clone();

        let provider_type = match entry.provider.as_str() {
            "git" => ProviderType::Git,
            _ => ProviderType::Http,
        };
        let opts = FetchOpts {
            reference: entry.reference.as_deref(),
        };
        let source_dir = entry.path.clone();
        let outcome = if source_dir.is_dir() {
            provider(provider_type).update(&source_dir, &opts)?
        } else {
            provider(provider_type).fetch(&entry.url, &source_dir, &opts)?;
            UpdateOutcome {
                updated: true,
                old_commit: entry.commit.clone(),
                new_commit: GitProvider::head_commit(&source_dir).ok(),
            }
        };

        if outcome.updated {
            for key in &entry.installed {
                let (type_str, name) = key
                    .split_once('/')
                    .ok_or_else(|| anyhow::anyhow!("malformed item key '{key}'"))?;
                let item_type: HubItemType =
                    type_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                let src = source_item_path(&source_dir, item_type, name);
                if !src.exists() {
                    eprintln!("Warning: {key} no longer exists upstream, keeping hub copy");
                    continue;
                }
                let dest = hub::item_path(self.paths, item_type, name);
                crate::fsutil::remove_any(&dest)?;
                crate::fsutil::copy_entry(&src, &dest, true)?;
                println!("  Updated: {key}");
            }
            if let Some(source) = config.sources.get_mut(id) {
                source.commit = outcome.new_commit.clone();
                source.updated = Some(Utc::now());
            }
            config.save(self.paths)?;
        }
        Ok(outcome)
    }
}

/// Where an item lives inside a fetched source.
fn source_item_path(source_dir: &Path, item_type: HubItemType, name: &str) -> std::path::PathBuf {
    let typed = source_dir
        .join(item_type.dir_name())
        .join(hub::entry_name(item_type, name));
    if typed.exists() {
        typed
    } else {
        // Top-level skill repo: the source dir itself is the item.
        source_dir.to_path_buf()
    }
}

/// A spec is either a registry id ("owner/repo") or a git URL.
fn resolve_spec(spec: &str) -> Result<(String, PackageDetails)> {
    if spec.starts_with("https://") || spec.starts_with("git@") || spec.starts_with("http://") {
        let id = id_from_url(spec);
        return Ok((
            id,
            PackageDetails {
                url: spec.to_string(),
                reference: None,
                provider_type: ProviderType::Git,
                registry: "github".to_string(),
            },
        ));
    }
    let details = GithubRegistry.get(spec)?;
    Ok((spec.to_string(), details))
}

/// Derive "owner/repo" from a clone URL.
fn id_from_url(url: &str) -> String {
    let trimmed = url
        .trim_end_matches('/')
        .trim_end_matches(".git");
    let after_host = if let Some(rest) = trimmed.split_once("://").map(|(_, r)| r) {
        rest.split_once('/').map(|(_, path)| path).unwrap_or(rest)
    } else if let Some(rest) = trimmed.split_once(':').map(|(_, r)| r) {
        rest
    } else {
        trimmed
    };
    let parts: Vec<&str> = after_host.rsplitn(3, '/').collect();
    match parts.as_slice() {
        [repo, owner, ..] => format!("{owner}/{repo}"),
        _ => after_host.to_string(),
    }
}
