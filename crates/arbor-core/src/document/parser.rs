//! JSON parser for deployment documents with helpful error messages.

use std::path::Path;

use anyhow::Context;

use super::DeploymentDocument;
use super::schema::RawDeploymentDocument;
use crate::diagnostics::line_context;
use crate::error::DeploymentError;

/// Parse and validate a deployment document.
pub fn parse_document_str(content: &str) -> Result<DeploymentDocument, DeploymentError> {
    let raw: RawDeploymentDocument =
        serde_json::from_str(content).map_err(|e| enhance_json_error(e, content))?;
    DeploymentDocument::try_from(raw)
}

/// Read a deployment document file.
///
/// Only I/O is checked here. Parsing stays with [`parse_document_str`] so a
/// file with bad content still reaches the pipeline and is reported.
pub fn read_document_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read deployment document: {}", path.display()))
}

fn enhance_json_error(error: serde_json::Error, content: &str) -> DeploymentError {
    let line = error.line();
    if line == 0 {
        return DeploymentError::parse(error.to_string());
    }
    DeploymentError::parse(format!(
        "JSON parsing error at line {}:\n{}\n\nError: {}",
        line,
        line_context(content, line),
        error
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedKind;

    #[test]
    fn syntax_error_reports_line_context() {
        let content = "{\n  \"deploymentId\": \"d1\",\n  \"targetGroup\": ,\n}";

        let err = parse_document_str(content).unwrap_err();

        match err {
            DeploymentError::MalformedDocument { kind, reason } => {
                assert_eq!(kind, MalformedKind::Parse);
                assert!(reason.contains("line 3"), "{reason}");
                assert!(reason.contains(">>>"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
