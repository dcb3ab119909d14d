use crate::adapters::nexus::NexusClient;
use crate::domain::model::Component;
use crate::utils::error::Result;
use std::fs;
use std::path::Path;

pub const PYPI_FORMAT: &str = "pypi";

/// Pinned `name==version` lines for every pypi component, sorted by name then version.
pub fn render_manifest(components: &[Component]) -> String {
    let mut pypi: Vec<&Component> = components
        .iter()
        .filter(|component| component.format == PYPI_FORMAT)
        .collect();
    pypi.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

    pypi.iter()
        .map(|component| format!("{}\n", component.pinned()))
        .collect()
}

/// Writes the dependencies the pip proxy has served to `output`, replacing it.
/// Returns how many were written.
pub async fn dump_dependencies(nexus: &NexusClient, repository: &str, output: &Path) -> Result<usize> {
    let components = nexus.list_components(repository).await?;
    let manifest = render_manifest(&components);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &manifest)?;

    let count = manifest.lines().count();
    tracing::info!("Wrote {} dependencies to {}", count, output.display());
    Ok(count)
}
