//! Traffic-generator GraphML documents.
//!
//! The serving document is static apart from its listen port. The fetching
//! document is re-rendered before every run with the current peer and
//! transfer size; its `end` node stops the generator after one transfer so
//! the restart loop paces the next one.

use hsperf_common::{Error, Result};
use std::path::Path;

/// Placeholder values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub serverport: Option<u16>,
    pub socksport: Option<u16>,
    pub peers: Option<&'a str>,
    pub size: Option<&'a str>,
}

pub const DEFAULT_SERVER_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">
  <key attr.name="serverport" attr.type="string" for="node" id="d0" />
  <graph edgedefault="directed">
    <node id="start">
      <data key="d0">{serverport}</data>
    </node>
  </graph>
</graphml>
"#;

pub const DEFAULT_CLIENT_TEMPLATE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">
  <key attr.name="count" attr.type="string" for="node" id="d5" />
  <key attr.name="size" attr.type="string" for="node" id="d4" />
  <key attr.name="protocol" attr.type="string" for="node" id="d3" />
  <key attr.name="type" attr.type="string" for="node" id="d2" />
  <key attr.name="socksproxy" attr.type="string" for="node" id="d1" />
  <key attr.name="peers" attr.type="string" for="node" id="d0" />
  <graph edgedefault="directed">
    <node id="start">
      <data key="d0">{peers}</data>
      <data key="d1">127.0.0.1:{socksport}</data>
    </node>
    <node id="transfer">
      <data key="d2">get</data>
      <data key="d3">tcp</data>
      <data key="d4">{size}</data>
    </node>
    <node id="end">
      <data key="d5">1</data>
    </node>
    <edge source="start" target="transfer" />
    <edge source="transfer" target="end" />
  </graph>
</graphml>
"#;

/// A GraphML template, either built in or loaded from a file.
#[derive(Debug, Clone)]
pub struct GraphTemplate {
    source: String,
}

impl GraphTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn default_server() -> Self {
        Self::new(DEFAULT_SERVER_TEMPLATE)
    }

    pub fn default_client() -> Self {
        Self::new(DEFAULT_CLIENT_TEMPLATE)
    }

    /// Load a template file, or fall back to `default` when none is given.
    pub fn load_or(path: Option<&Path>, default: fn() -> Self) -> Result<Self> {
        match path {
            Some(path) => std::fs::read_to_string(path).map(Self::new).map_err(|e| {
                Error::config(format!(
                    "Failed to read template {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Ok(default()),
        }
    }

    /// Substitute every placeholder. A placeholder left without a value is
    /// an error rather than a literal `{name}` in the output.
    pub fn render(&self, vars: &TemplateVars<'_>) -> Result<String> {
        let mut rendered = self.source.clone();
        let substitutions = [
            ("{serverport}", vars.serverport.map(|p| p.to_string())),
            ("{socksport}", vars.socksport.map(|p| p.to_string())),
            ("{peers}", vars.peers.map(escape_xml)),
            ("{size}", vars.size.map(escape_xml)),
        ];

        for (placeholder, value) in substitutions {
            if !rendered.contains(placeholder) {
                continue;
            }
            let value = value.ok_or_else(|| {
                Error::config(format!("No value for template placeholder {}", placeholder))
            })?;
            rendered = rendered.replace(placeholder, &value);
        }

        Ok(rendered)
    }

    /// Render and replace `path` atomically, so a starting generator never
    /// reads a half-written document.
    pub fn write(&self, path: &Path, vars: &TemplateVars<'_>) -> Result<()> {
        let rendered = self.render(vars)?;
        write_atomic(path, rendered.as_bytes())
    }
}

pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
