// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fatal-error reports written to the diagnostic stream.
//!
//! When a session ends with an error the daemon only sees the processor exit.
//! The report left on stderr is what an operator reads afterwards:
//!
//! ```text
//! kcl bridge terminated: malformed message `not json`: invalid JSON: expected ident at line 1 column 2
//! caused by: invalid JSON: expected ident at line 1 column 2
//! caused by: expected ident at line 1 column 2
//! ```

use std::error::Error;

use crate::LineTransport;

/// Prefix of the first line of every report.
pub const TERMINATED: &str = "kcl bridge terminated";

/// Render `err` and its chain of sources, one entry per line.
#[must_use]
pub fn describe(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut lines = vec![format!("{TERMINATED}: {err}")];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines
}

/// Write the report for `err` to the transport's diagnostic stream.
pub async fn report(
    transport: &mut LineTransport,
    err: &(dyn Error + 'static),
) -> std::io::Result<()> {
    for line in describe(err) {
        transport.write_diagnostic(&line).await?;
    }
    Ok(())
}
