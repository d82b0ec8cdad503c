//! Runtime-library rewrite of generated MSBuild projects
//!
//! Streams the project through quick-xml, replacing the text of
//! `ItemDefinitionGroup/ClCompile/RuntimeLibrary` in groups whose
//! `Condition` names the configuration. Every other event is written back
//! from its raw bytes, so unrelated markup keeps its exact formatting.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::RuntimeLibrary;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("no ClCompile/RuntimeLibrary for configuration '{configuration}' in {path}")]
    TargetNotFound { path: PathBuf, configuration: String },

    #[error("malformed project {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of a rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub bytes: Vec<u8>,
    /// Matching RuntimeLibrary elements
    pub matched: usize,
    /// Whether any value changed
    pub changed: bool,
}

fn condition_matches(start: &BytesStart<'_>, configuration: &str) -> bool {
    let Ok(Some(attr)) = start.try_get_attribute("Condition") else {
        return false;
    };
    let Ok(condition) = attr.unescape_value() else {
        return false;
    };
    condition.contains(&format!("'{}|", configuration))
        || condition.contains(&format!("'{}'", configuration))
}

/// Rewrite the runtime library for `configuration` in project `xml`.
///
/// Errors are returned as messages; `matched == 0` means the target node
/// was absent.
pub fn rewrite_runtime_library(
    xml: &[u8],
    configuration: &str,
    value: &str,
) -> Result<Rewrite, String> {
    let (bom, body) = match xml.strip_prefix(UTF8_BOM) {
        Some(rest) => (UTF8_BOM, rest),
        None => (&[][..], xml),
    };

    let mut reader = Reader::from_reader(body);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 16));
    let mut buf = Vec::new();

    let mut group_depth: Option<usize> = None;
    let mut in_clcompile = false;
    let mut in_runtime = false;
    let mut wrote_value = false;
    let mut depth = 0usize;
    let mut matched = 0usize;
    let mut changed = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            Event::Eof => break,
            Event::Start(ref start) => {
                depth += 1;
                let name = start.local_name();
                match name.as_ref() {
                    b"ItemDefinitionGroup" if condition_matches(start, configuration) => {
                        group_depth = Some(depth);
                    }
                    b"ClCompile" if group_depth == Some(depth - 1) => in_clcompile = true,
                    b"RuntimeLibrary" if in_clcompile => {
                        in_runtime = true;
                        wrote_value = false;
                        matched += 1;
                    }
                    _ => {}
                }
                writer.write_event(event.borrow()).map_err(|e| e.to_string())?;
            }
            Event::Text(ref text) if in_runtime => {
                if !wrote_value {
                    let current = text.unescape().map_err(|e| e.to_string())?;
                    if current.trim() != value {
                        changed = true;
                    }
                    writer
                        .write_event(Event::Text(BytesText::new(value)))
                        .map_err(|e| e.to_string())?;
                    wrote_value = true;
                }
            }
            Event::End(ref end) => {
                match end.local_name().as_ref() {
                    b"RuntimeLibrary" if in_runtime => {
                        if !wrote_value {
                            changed = true;
                            writer
                                .write_event(Event::Text(BytesText::new(value)))
                                .map_err(|e| e.to_string())?;
                        }
                        in_runtime = false;
                    }
                    b"ClCompile" if in_clcompile => in_clcompile = false,
                    b"ItemDefinitionGroup" if group_depth == Some(depth) => group_depth = None,
                    _ => {}
                }
                depth = depth.saturating_sub(1);
                writer.write_event(event.borrow()).map_err(|e| e.to_string())?;
            }
            Event::Empty(ref empty) if in_clcompile && empty.local_name().as_ref() == b"RuntimeLibrary" => {
                // <RuntimeLibrary/> has no value yet: expand it
                matched += 1;
                changed = true;
                let name = String::from_utf8_lossy(empty.name().as_ref()).to_string();
                writer
                    .write_event(Event::Start(BytesStart::new(name.as_str())))
                    .map_err(|e| e.to_string())?;
                writer
                    .write_event(Event::Text(BytesText::new(value)))
                    .map_err(|e| e.to_string())?;
                writer
                    .write_event(Event::End(BytesEnd::new(name.as_str())))
                    .map_err(|e| e.to_string())?;
            }
            other => {
                writer.write_event(other).map_err(|e| e.to_string())?;
            }
        }
        buf.clear();
    }

    let mut bytes = bom.to_vec();
    bytes.extend(writer.into_inner());
    Ok(Rewrite {
        bytes,
        matched,
        changed,
    })
}

/// Rewrites RuntimeLibrary in generated projects
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectMutator;

impl ProjectMutator {
    /// Set the runtime library of `configuration` in `project`; returns whether the file changed.
    ///
    /// Under dry-run the file is parsed and checked but not written.
    pub fn mutate(
        &self,
        project: &Path,
        configuration: &str,
        runtime: RuntimeLibrary,
        dry_run: bool,
    ) -> Result<bool, MutationError> {
        let xml = fs::read(project).map_err(|source| MutationError::Io {
            path: project.to_path_buf(),
            source,
        })?;
        let rewrite = rewrite_runtime_library(&xml, configuration, runtime.as_str()).map_err(
            |message| MutationError::Xml {
                path: project.to_path_buf(),
                message,
            },
        )?;

        if rewrite.matched == 0 {
            return Err(MutationError::TargetNotFound {
                path: project.to_path_buf(),
                configuration: configuration.to_string(),
            });
        }
        if !rewrite.changed {
            tracing::info!(project = %project.display(), runtime = runtime.as_str(), "runtime library already set");
            return Ok(false);
        }
        if dry_run {
            tracing::info!(project = %project.display(), runtime = runtime.as_str(), "[dry-run] would rewrite runtime library");
            return Ok(true);
        }

        fs::write(project, &rewrite.bytes).map_err(|source| MutationError::Io {
            path: project.to_path_buf(),
            source,
        })?;
        tracing::info!(
            project = %project.display(),
            configuration,
            runtime = runtime.as_str(),
            elements = rewrite.matched,
            "runtime library rewritten"
        );
        Ok(true)
    }
}
