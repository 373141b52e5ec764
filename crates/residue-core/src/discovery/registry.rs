//! Registry heuristics: uninstall entries and per-vendor software keys.

use std::path::Path;

use super::{DiscoveryInput, Heuristic, HeuristicOutput};
use crate::error::DiscoveryError;
use crate::types::{Artifact, ArtifactType, DiscoverySource, Presence};

pub const UNINSTALL_ROOTS: &[&str] = &[
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
];

pub const SOFTWARE_ROOTS: &[&str] = &[
    r"HKLM\SOFTWARE",
    r"HKLM\SOFTWARE\WOW6432Node",
    r"HKCU\SOFTWARE",
];

/// Uninstall entries whose key name is the app id or whose `DisplayName`
/// mentions the application name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryUninstallScan;

impl Heuristic for RegistryUninstallScan {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::RegistryUninstall
    }

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError> {
        let registry = input.ctx.registry();
        if !registry.is_available() {
            return Err(DiscoveryError::Unavailable("registry"));
        }
        let app_name = input.app.name.trim().to_lowercase();
        let min_len = input.ctx.config().discovery.min_token_len;
        let mut artifacts = Vec::new();

        for root in UNINSTALL_ROOTS {
            for subkey in registry.subkeys(root)? {
                input.check_deadline()?;
                let key = format!(r"{}\{}", root, subkey);
                let by_id = subkey.eq_ignore_ascii_case(&input.app.app_id);
                let by_name = app_name.chars().count() >= min_len
                    && registry
                        .string_value(&key, "DisplayName")?
                        .is_some_and(|display| names_product(&display, &app_name));
                if !(by_id || by_name) {
                    continue;
                }
                tracing::debug!(key = %key, "matched uninstall entry");

                if let Some(location) = registry.string_value(&key, "InstallLocation")? {
                    let location = location.trim().trim_matches('"');
                    if let Some(dir) = existing_directory(input, location)? {
                        artifacts.push(dir);
                    }
                }
                artifacts.push(Artifact::new(
                    ArtifactType::Registry,
                    key,
                    None,
                    DiscoverySource::RegistryUninstall,
                ));
            }
        }
        Ok(HeuristicOutput::new(artifacts))
    }
}

/// Whether `display` contains `app_name` (lower-cased) as whole words, so
/// "Git" does not claim "GitHub Desktop".
fn names_product(display: &str, app_name: &str) -> bool {
    let display = display.to_lowercase();
    let is_word = |c: Option<char>| c.is_some_and(char::is_alphanumeric);
    display.match_indices(app_name).any(|(start, matched)| {
        let before = display[..start].chars().next_back();
        let after = display[start + matched.len()..].chars().next();
        !is_word(before) && !is_word(after)
    })
}

fn existing_directory(
    input: &DiscoveryInput<'_>,
    location: &str,
) -> Result<Option<Artifact>, DiscoveryError> {
    if location.is_empty()
        || input
            .ctx
            .guard()
            .is_protected(ArtifactType::Directory, location)
    {
        return Ok(None);
    }
    let path = Path::new(location);
    if !matches!(input.ctx.filesystem().probe(path), Ok(Presence::Present)) || !path.is_dir() {
        return Ok(None);
    }
    Ok(Some(Artifact::new(
        ArtifactType::Directory,
        location,
        input.size_of(path)?,
        DiscoverySource::RegistryUninstall,
    )))
}

/// `SOFTWARE\<token>` and `SOFTWARE\<Publisher>\<Product>` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrySoftwareKeys;

impl Heuristic for RegistrySoftwareKeys {
    fn source(&self) -> DiscoverySource {
        DiscoverySource::RegistrySoftware
    }

    fn discover(&self, input: &DiscoveryInput<'_>) -> Result<HeuristicOutput, DiscoveryError> {
        let registry = input.ctx.registry();
        if !registry.is_available() {
            return Err(DiscoveryError::Unavailable("registry"));
        }
        let min_len = input.ctx.config().discovery.min_token_len;
        let publisher = publisher_segment(&input.app.app_id, min_len);
        let matches_token = |name: &str| {
            let lower = name.to_lowercase();
            input.tokens.iter().any(|token| *token == lower)
        };
        let mut artifacts = Vec::new();

        for root in SOFTWARE_ROOTS {
            for subkey in registry.subkeys(root)? {
                input.check_deadline()?;
                let key = format!(r"{}\{}", root, subkey);
                if matches_token(&subkey) {
                    artifacts.push(software_key(key));
                    continue;
                }
                if publisher.as_deref() != Some(subkey.to_lowercase().as_str()) {
                    continue;
                }
                for child in registry.subkeys(&key)? {
                    input.check_deadline()?;
                    if matches_token(&child) {
                        artifacts.push(software_key(format!(r"{}\{}", key, child)));
                    }
                }
            }
        }
        Ok(HeuristicOutput::new(artifacts))
    }
}

fn software_key(path: String) -> Artifact {
    Artifact::new(
        ArtifactType::Registry,
        path,
        None,
        DiscoverySource::RegistrySoftware,
    )
}

/// `Publisher` of a `Publisher.Product` app id, lower-cased.
fn publisher_segment(app_id: &str, min_len: usize) -> Option<String> {
    let (publisher, _) = app_id.split_once('.')?;
    let lower = publisher.trim().to_lowercase();
    (lower.chars().count() >= min_len).then_some(lower)
}
