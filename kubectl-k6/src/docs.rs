// Copyright (c) The kubectl-k6 Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ExpectedError, KubectlK6App, errors::Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::CommandFactory;

/// The file the command-line reference is written to.
pub(crate) const DOCS_FILE_NAME: &str = "kubectl-k6.md";

/// Renders the markdown reference for every command into `output_dir`, returning the path
/// written.
pub(crate) fn write_docs(output_dir: &Utf8Path) -> Result<Utf8PathBuf> {
    std::fs::create_dir_all(output_dir).map_err(|err| ExpectedError::DocsCreateDir {
        path: output_dir.to_owned(),
        err,
    })?;

    let markdown = clap_markdown::help_markdown_command(&KubectlK6App::command());
    let path = output_dir.join(DOCS_FILE_NAME);
    std::fs::write(&path, markdown).map_err(|err| ExpectedError::DocsWrite {
        path: path.clone(),
        err,
    })?;
    Ok(path)
}
