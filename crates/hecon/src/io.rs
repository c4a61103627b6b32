//! Request loading and response rendering
//!
//! Requests and responses are YAML or JSON, chosen by file extension.

use std::fs;
use std::io;
use std::path::Path;

use color_eyre::eyre::{Context, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// Format implied by the file extension (`.yaml`, `.yml` or `.json`).
    pub fn from_path(path: &Path) -> color_eyre::Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(Format::Yaml),
            Some("json") => Ok(Format::Json),
            _ => bail!(
                "cannot tell the format of {}: expected a .yaml, .yml or .json file",
                path.display()
            ),
        }
    }
}

pub fn parse_request<T: DeserializeOwned>(content: &str, format: Format) -> color_eyre::Result<T> {
    let request = match format {
        Format::Yaml => serde_saphyr::from_str(content).wrap_err("invalid YAML request")?,
        Format::Json => serde_json::from_str(content).wrap_err("invalid JSON request")?,
    };
    Ok(request)
}

pub fn read_request<T: DeserializeOwned>(path: &Path) -> color_eyre::Result<T> {
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    parse_request(&content, format).wrap_err_with(|| format!("in {}", path.display()))
}

/// Render a response. `compact` only affects JSON.
pub fn render<T: Serialize>(value: &T, format: Format, compact: bool) -> color_eyre::Result<String> {
    let mut rendered = match (format, compact) {
        (Format::Yaml, _) => serde_saphyr::to_string(value).wrap_err("failed to render YAML")?,
        (Format::Json, true) => serde_json::to_string(value)?,
        (Format::Json, false) => serde_json::to_string_pretty(value)?,
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Write content to a file atomically using write-then-rename.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    fs::write(temp_path, content)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hecon_core::markov::CohortParams;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.yaml")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.YML")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a.json")).unwrap(), Format::Json);
        assert!(Format::from_path(Path::new("a.toml")).is_err());
        assert!(Format::from_path(&PathBuf::from("request")).is_err());
    }

    #[test]
    fn test_yaml_and_json_requests_agree() {
        let yaml: CohortParams =
            parse_request("time_horizon: 15\ncost_drug_a: 4000\n", Format::Yaml).unwrap();
        let json: CohortParams =
            parse_request(r#"{"time_horizon": 15, "cost_drug_a": 4000}"#, Format::Json).unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml.time_horizon, 15.0);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: color_eyre::Result<CohortParams> =
            parse_request("time_horizn: 15\n", Format::Yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");

        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("out.json.tmp").exists());
    }

    #[test]
    fn test_render_compact_json_is_one_line() {
        let params = CohortParams::default();
        let compact = render(&params, Format::Json, true).unwrap();
        assert_eq!(compact.lines().count(), 1);
        let pretty = render(&params, Format::Json, false).unwrap();
        assert!(pretty.lines().count() > 1);
    }
}
