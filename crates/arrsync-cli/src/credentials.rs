//! Resolving service endpoints and API keys
//!
//! This is the only place that reads credentials from the environment or
//! from disk. The engine receives finished [`ServiceEndpoint`] values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use arrsync_client::ServiceEndpoint;
use arrsync_core::{Document, ServiceDecl};

use crate::error::{CliError, Result};

/// Conventional variable consulted when a service declares no key source,
/// e.g. `ARRSYNC_TV_API_KEY` for a service named `tv`.
pub fn default_key_variable(service: &str) -> String {
    let name: String = service
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ARRSYNC_{name}_API_KEY")
}

/// API key for one service.
///
/// Sources in order: `apiKeyEnv`, `apiKeyFile` (relative to `base_dir`),
/// the inline `apiKey`, then [`default_key_variable`].
pub fn resolve_api_key<F>(service: &str, decl: &ServiceDecl, base_dir: &Path, env: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(var) = &decl.api_key_env {
        return env(var)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().to_string())
            .ok_or_else(|| CliError::credentials(service, format!("environment variable {var} is not set")));
    }

    if let Some(file) = &decl.api_key_file {
        let path = base_dir.join(file);
        let key = fs::read_to_string(&path).map_err(|e| {
            CliError::credentials(service, format!("cannot read {}: {e}", path.display()))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::credentials(service, format!("{} is empty", path.display())));
        }
        return Ok(key.to_string());
    }

    if let Some(key) = &decl.api_key {
        return Ok(key.clone());
    }

    let var = default_key_variable(service);
    env(&var).filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        CliError::credentials(
            service,
            format!("no apiKey, apiKeyEnv or apiKeyFile declared and {var} is not set"),
        )
    })
}

/// Endpoints for every declared service.
pub fn resolve_endpoints<F>(
    document: &Document,
    base_dir: &Path,
    request_timeout: Duration,
    env: F,
) -> Result<BTreeMap<String, ServiceEndpoint>>
where
    F: Fn(&str) -> Option<String>,
{
    document
        .services
        .iter()
        .map(|(name, decl)| {
            let key = resolve_api_key(name, decl, base_dir, &env)?;
            let endpoint = ServiceEndpoint::new(name.clone(), decl.service_type, decl.url.clone(), key)
                .with_request_timeout(request_timeout);
            Ok((name.clone(), endpoint))
        })
        .collect()
}
